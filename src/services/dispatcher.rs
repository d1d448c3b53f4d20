//! Decode dispatch: XML snapshot → device state
//!
//! One generic decoder driven by the per-family tables in
//! [`SensorTypeRegistry`]. Each configured device is evaluated once per
//! server snapshot; field-level problems degrade to
//! [`StateValue::Unsupported`] and device-level problems mark only that
//! device offline.

use crate::client::details_parser::{SensorElement, XmlSnapshot};
use crate::error::{OwServerError, Result};
use crate::services::sensor_registry::{
    DeviceKind, PrimarySelector, PrimarySource, SensorFamily, SensorTypeRegistry, StateImage,
};
use crate::services::state_manager::{DeviceRecord, DeviceStore, DeviceUpdate, StateValue};
use crate::services::unit_converter::{self, Conversion, UnitPreferences};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Why a device was not evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    /// Missing ROM ID or server address
    Unconfigured,
    /// Bound to a different server than the snapshot
    OtherServer,
}

/// Result of evaluating one device against one snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Skipped(SkipReason),
    /// No element for this sensor in the snapshot; state stays as it was
    NoMatch,
    Updated(DeviceUpdate),
    Failed(String),
}

/// Tally of one server's dispatch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sensors_updated: usize,
    pub servers_updated: usize,
    pub failed: usize,
}

/// Evaluate one device against the snapshot fetched from `server`
pub fn dispatch(
    device: &DeviceRecord,
    snapshot: &XmlSnapshot,
    server: &str,
    prefs: &UnitPreferences,
) -> DecodeOutcome {
    if !device.enabled {
        return DecodeOutcome::Skipped(SkipReason::Disabled);
    }
    if !device.is_configured() {
        return DecodeOutcome::Skipped(SkipReason::Unconfigured);
    }
    if device.server() != Some(server.trim()) {
        return DecodeOutcome::Skipped(SkipReason::OtherServer);
    }

    let decoded = match device.kind {
        DeviceKind::Server => decode_server(snapshot).map(Some),
        DeviceKind::Sensor(family) => {
            let rom = device.rom().unwrap_or_default();
            match snapshot.find_sensor(family, rom) {
                Some(element) => decode_sensor(device, family, element, prefs).map(Some),
                None => Ok(None),
            }
        }
    };

    match decoded {
        Ok(Some(update)) => DecodeOutcome::Updated(update),
        Ok(None) => DecodeOutcome::NoMatch,
        Err(e) => DecodeOutcome::Failed(e.to_string()),
    }
}

/// Dispatch a snapshot to every device and write the results to the store
pub fn dispatch_server(
    store: &mut DeviceStore,
    snapshot: &XmlSnapshot,
    server: &str,
    prefs: &UnitPreferences,
    now: DateTime<Utc>,
) -> DispatchSummary {
    let mut summary = DispatchSummary::default();
    let mut outcomes = Vec::new();

    for device in store.devices() {
        let outcome = dispatch(device, snapshot, server, prefs);
        match &outcome {
            DecodeOutcome::Skipped(SkipReason::Unconfigured) => {
                info!(device = %device.name, "Device is not fully configured; waiting");
            }
            DecodeOutcome::Skipped(_) => {}
            DecodeOutcome::NoMatch => {
                debug!(device = %device.name, server = %server, "No matching element this cycle");
            }
            DecodeOutcome::Updated(_) => {
                if device.kind.is_server() {
                    summary.servers_updated += 1;
                } else {
                    summary.sensors_updated += 1;
                }
            }
            DecodeOutcome::Failed(reason) => {
                warn!(device = %device.name, server = %server, "Unable to decode device: {}", reason);
                summary.failed += 1;
            }
        }
        outcomes.push((device.id.clone(), outcome));
    }

    for (id, outcome) in outcomes {
        let written = match outcome {
            DecodeOutcome::Updated(update) => store.apply(&id, update, now),
            DecodeOutcome::Failed(_) => store.mark_failed(&id, now),
            _ => Ok(()),
        };
        if let Err(e) = written {
            warn!(device = %id, "Unable to write device state: {}", e);
        }
    }

    summary
}

fn decode_server(snapshot: &XmlSnapshot) -> Result<DeviceUpdate> {
    let connected = snapshot
        .server_field("DevicesConnected")
        .map(str::trim)
        .ok_or_else(|| OwServerError::device_decode("server has no DevicesConnected field"))?;

    let states = SensorTypeRegistry::field_mapping(DeviceKind::Server)
        .iter()
        .map(|mapping| {
            let value = snapshot
                .server_field(&mapping.xml_field)
                .map(StateValue::text)
                .unwrap_or(StateValue::Unsupported);
            (mapping.state_key.clone(), value)
        })
        .collect();

    let summary = match connected.parse::<u64>() {
        Ok(1) => "1 sensor".to_string(),
        Ok(n) => format!("{n} sensors"),
        Err(_) => format!("{connected} sensors"),
    };

    Ok(DeviceUpdate {
        states,
        primary: Some((StateValue::Text(summary), StateImage::SensorOn)),
        address: snapshot.server_field("MACAddress").map(str::to_string),
        mirror: Vec::new(),
    })
}

fn decode_sensor(
    device: &DeviceRecord,
    family: SensorFamily,
    element: &SensorElement,
    prefs: &UnitPreferences,
) -> Result<DeviceUpdate> {
    let spec = SensorTypeRegistry::family(family);
    let compensation = device.props.temp_compensation;

    let mut states: Vec<(String, StateValue)> = spec
        .fields
        .iter()
        .map(|mapping| {
            let value = decode_field(element, &mapping.xml_field, mapping.conversion, compensation, prefs);
            (mapping.state_key.clone(), value)
        })
        .collect();

    let latch = match spec.latch_field {
        Some(field) => {
            let bits = latch_bits(element.field(field));
            if bits.is_none() {
                debug!(device = %device.name, "Latch state {:?} is not an 8-bit value", element.field(field));
            }
            for n in 0..8 {
                let value = bits
                    .as_ref()
                    .map(|b| StateValue::text(&b[n..=n]))
                    .unwrap_or(StateValue::Unsupported);
                states.push((format!("owsInput{}", n + 1), value));
            }
            Some(bits)
        }
        None => None,
    };

    let selector = device
        .selector_key()
        .and_then(|key| SensorTypeRegistry::primary_value_selector(family, key));
    let primary = match selector {
        Some(selector) => Some(primary_value(selector, element, latch.as_ref(), compensation, prefs)?),
        None => {
            debug!(
                device = %device.name,
                "Unknown primary value selector {:?}; leaving primary value unchanged",
                device.props.primary_selector
            );
            None
        }
    };

    let mirror = spec
        .mirror
        .iter()
        .filter_map(|field| match element.field(field) {
            Some(value) => Some((field.clone(), value.to_string())),
            None => {
                debug!(device = %device.name, "Mirror field {} absent; property left as is", field);
                None
            }
        })
        .collect();

    Ok(DeviceUpdate {
        states,
        primary,
        address: element.rom_id().map(str::to_string),
        mirror,
    })
}

fn decode_field(
    element: &SensorElement,
    xml_field: &str,
    conversion: Option<Conversion>,
    compensation: f64,
    prefs: &UnitPreferences,
) -> StateValue {
    let Some(raw) = element.field(xml_field) else {
        return StateValue::Unsupported;
    };
    match conversion {
        None => StateValue::text(raw),
        Some(conversion) => match unit_converter::convert(xml_field, raw, conversion, compensation, prefs) {
            Ok(value) => StateValue::Text(value),
            Err(e) => {
                debug!("{}", e);
                StateValue::Unsupported
            }
        },
    }
}

/// Unpack a latch state into eight binary digits, most significant first
pub fn latch_bits(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim().parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 || value >= 256.0 {
        return None;
    }
    Some(format!("{:08b}", value as u8))
}

fn primary_value(
    selector: &PrimarySelector,
    element: &SensorElement,
    latch: Option<&Option<String>>,
    compensation: f64,
    prefs: &UnitPreferences,
) -> Result<(StateValue, StateImage)> {
    let value = match &selector.source {
        PrimarySource::Field { xml_field, conversion } => {
            decode_field(element, xml_field, *conversion, compensation, prefs)
        }
        PrimarySource::LatchBit(bit) => {
            let bits = latch.ok_or_else(|| {
                OwServerError::device_decode(format!("selector {} needs a latch field", selector.key))
            })?;
            let index = 7usize.saturating_sub(*bit as usize);
            bits.as_ref()
                .map(|b| StateValue::text(&b[index..=index]))
                .unwrap_or(StateValue::Unsupported)
        }
    };

    let image = match value.as_text() {
        Some(text) => selector.image.image_for(text),
        None => StateImage::Error,
    };
    Ok((value, image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::parse_details;
    use crate::mock::{details_xml, SensorXml};
    use crate::services::unit_converter::TemperatureUnit;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const SERVER: &str = "10.0.0.5";

    fn prefs() -> UnitPreferences {
        UnitPreferences::default()
    }

    fn snapshot(sensors: &[SensorXml]) -> XmlSnapshot {
        parse_details(&details_xml(sensors)).unwrap()
    }

    fn updated(outcome: DecodeOutcome) -> DeviceUpdate {
        match outcome {
            DecodeOutcome::Updated(update) => update,
            other => panic!("expected update, got {other:?}"),
        }
    }

    fn state<'a>(update: &'a DeviceUpdate, key: &str) -> &'a StateValue {
        &update.states.iter().find(|(k, _)| k == key).unwrap().1
    }

    #[test]
    fn test_ds18b20_temperature_and_primary() {
        let device = DeviceRecord::new_sensor("t", "Attic", SensorFamily::Ds18b20, SERVER, "28AA");
        let xml = snapshot(&[SensorXml::new("DS18B20", "28AA")
            .field("Temperature", "20.0")
            .field("UserByte1", "0")
            .field("UserByte2", "0")]);

        let update = updated(dispatch(&device, &xml, SERVER, &prefs()));
        assert_eq!(state(&update, "owsTemperature"), &StateValue::text("68.0"));
        assert_eq!(
            update.primary,
            Some((StateValue::text("68.0"), StateImage::TemperatureSensor))
        );
        assert_eq!(update.address.as_deref(), Some("28AA"));
        assert_eq!(
            update.mirror,
            vec![
                ("UserByte1".to_string(), "0".to_string()),
                ("UserByte2".to_string(), "0".to_string())
            ]
        );
    }

    #[test]
    fn test_missing_fields_are_unsupported() {
        let device = DeviceRecord::new_sensor("t", "Attic", SensorFamily::Ds18b20, SERVER, "28AA");
        let xml = snapshot(&[SensorXml::new("DS18B20", "28AA").field("Temperature", "n/a")]);

        let update = updated(dispatch(&device, &xml, SERVER, &prefs()));
        // Every mapped key is present even though most fields are absent
        assert_eq!(
            update.states.len(),
            SensorTypeRegistry::field_mapping(device.kind).len()
        );
        assert_eq!(state(&update, "owsTemperature"), &StateValue::Unsupported);
        assert_eq!(state(&update, "owsPowerSource"), &StateValue::Unsupported);
        assert_eq!(state(&update, "owsRomID"), &StateValue::text("28AA"));
        assert_eq!(update.primary, Some((StateValue::Unsupported, StateImage::Error)));
    }

    #[test]
    fn test_compensation_applies_to_measured_temperature_only() {
        let device = DeviceRecord::new_sensor("h", "Barn", SensorFamily::Eds0065, SERVER, "7E01")
            .with_compensation(-1.0)
            .with_selector("DP");
        let xml = snapshot(&[SensorXml::new("EDS0065", "7E01")
            .field("Temperature", "21.0")
            .field("DewPoint", "10.0")]);
        let prefs = UnitPreferences {
            temperature: TemperatureUnit::Celsius,
            ..UnitPreferences::default()
        };

        let update = updated(dispatch(&device, &xml, SERVER, &prefs));
        assert_eq!(state(&update, "owsTemperature"), &StateValue::text("20.0"));
        assert_eq!(state(&update, "owsDewPoint"), &StateValue::text("10.0"));
        assert_eq!(
            update.primary,
            Some((StateValue::text("10.0"), StateImage::SensorOff))
        );
    }

    #[test]
    fn test_unknown_selector_leaves_primary_unset() {
        let device = DeviceRecord::new_sensor("t", "Attic", SensorFamily::Ds18b20, SERVER, "28AA")
            .with_selector("Bogus");
        let xml = snapshot(&[SensorXml::new("DS18B20", "28AA").field("Temperature", "20.0")]);

        let update = updated(dispatch(&device, &xml, SERVER, &prefs()));
        assert_eq!(update.primary, None);
        assert_eq!(state(&update, "owsTemperature"), &StateValue::text("68.0"));
    }

    #[rstest]
    #[case("S_0", "1", StateImage::SensorOff)]
    #[case("S_1", "0", StateImage::SensorOn)]
    #[case("S_7", "1", StateImage::SensorOff)]
    fn test_ds2408_latch(#[case] selector: &str, #[case] expected: &str, #[case] image: StateImage) {
        let device = DeviceRecord::new_sensor("s", "Bank", SensorFamily::Ds2408, SERVER, "29AA")
            .with_selector(selector);
        // 0b1000_0101
        let xml = snapshot(&[SensorXml::new("DS2408", "29AA").field("PIOOutputLatchState", "133")]);

        let update = updated(dispatch(&device, &xml, SERVER, &prefs()));
        assert_eq!(state(&update, "owsInput1"), &StateValue::text("1"));
        assert_eq!(state(&update, "owsInput2"), &StateValue::text("0"));
        assert_eq!(state(&update, "owsInput8"), &StateValue::text("1"));
        assert_eq!(update.primary, Some((StateValue::text(expected), image)));
    }

    #[rstest]
    #[case(Some("256"))]
    #[case(Some("-1"))]
    #[case(Some("open"))]
    #[case(None)]
    fn test_ds2408_bad_latch(#[case] raw: Option<&str>) {
        let device = DeviceRecord::new_sensor("s", "Bank", SensorFamily::Ds2408, SERVER, "29AA");
        let mut sensor = SensorXml::new("DS2408", "29AA");
        if let Some(raw) = raw {
            sensor = sensor.field("PIOOutputLatchState", raw);
        }

        let update = updated(dispatch(&device, &snapshot(&[sensor]), SERVER, &prefs()));
        assert_eq!(state(&update, "owsInput3"), &StateValue::Unsupported);
        assert_eq!(update.primary, Some((StateValue::Unsupported, StateImage::Error)));
    }

    #[test]
    fn test_latch_bits() {
        assert_eq!(latch_bits(Some("255")).as_deref(), Some("11111111"));
        assert_eq!(latch_bits(Some("4.0")).as_deref(), Some("00000100"));
        assert_eq!(latch_bits(Some("0")).as_deref(), Some("00000000"));
        assert_eq!(latch_bits(Some("300")), None);
    }

    #[test]
    fn test_led_primary_image() {
        let device = DeviceRecord::new_sensor("l", "Panel", SensorFamily::Eds0064, SERVER, "7E02")
            .with_selector("LED");
        let xml = snapshot(&[SensorXml::new("EDS0064", "7E02").field("LED", "1")]);
        let update = updated(dispatch(&device, &xml, SERVER, &prefs()));
        assert_eq!(update.primary, Some((StateValue::text("1"), StateImage::SensorOn)));
    }

    #[test]
    fn test_skips() {
        let xml = snapshot(&[SensorXml::new("DS18B20", "28AA").field("Temperature", "20.0")]);
        let device = DeviceRecord::new_sensor("t", "Attic", SensorFamily::Ds18b20, SERVER, "28AA");

        assert_eq!(
            dispatch(&device.clone().with_enabled(false), &xml, SERVER, &prefs()),
            DecodeOutcome::Skipped(SkipReason::Disabled)
        );
        assert_eq!(
            dispatch(&device, &xml, "10.0.0.6", &prefs()),
            DecodeOutcome::Skipped(SkipReason::OtherServer)
        );
        let unconfigured = DeviceRecord::new_sensor("u", "New", SensorFamily::Ds18b20, SERVER, "");
        assert_eq!(
            dispatch(&unconfigured, &xml, SERVER, &prefs()),
            DecodeOutcome::Skipped(SkipReason::Unconfigured)
        );
        let elsewhere = DeviceRecord::new_sensor("x", "Gone", SensorFamily::Ds18b20, SERVER, "28FF");
        assert_eq!(dispatch(&elsewhere, &xml, SERVER, &prefs()), DecodeOutcome::NoMatch);
    }

    #[test]
    fn test_family_must_match() {
        // Same ROM under a different family element does not match
        let device = DeviceRecord::new_sensor("t", "Attic", SensorFamily::Ds18s20, SERVER, "28AA");
        let xml = snapshot(&[SensorXml::new("DS18B20", "28AA")]);
        assert_eq!(dispatch(&device, &xml, SERVER, &prefs()), DecodeOutcome::NoMatch);
    }

    #[test]
    fn test_server_device() {
        let device = DeviceRecord::new_server("srv", "OWServer", SERVER);
        let xml = snapshot(&[SensorXml::new("DS18B20", "28AA")]);

        let update = updated(dispatch(&device, &xml, SERVER, &prefs()));
        assert_eq!(update.primary, Some((StateValue::text("1 sensor"), StateImage::SensorOn)));
        assert_eq!(update.address.as_deref(), Some("00:04:A3:00:00:01"));
        assert_eq!(state(&update, "owsDevicesConnected"), &StateValue::text("1"));
        assert_eq!(state(&update, "owsVoltageChannel3"), &StateValue::Unsupported);
    }

    #[test]
    fn test_server_without_device_count_fails() {
        let device = DeviceRecord::new_server("srv", "OWServer", SERVER);
        let xml = parse_details("<Devices-Detail-Response><PollCount>3</PollCount></Devices-Detail-Response>").unwrap();
        assert!(matches!(
            dispatch(&device, &xml, SERVER, &prefs()),
            DecodeOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_dispatch_server_writes_store() {
        let mut store = DeviceStore::new();
        store
            .insert(DeviceRecord::new_sensor("t", "Attic", SensorFamily::Ds18b20, SERVER, "28AA"))
            .unwrap();
        store.insert(DeviceRecord::new_server("srv", "OWServer", SERVER)).unwrap();
        store
            .insert(DeviceRecord::new_sensor("o", "Other", SensorFamily::Ds18b20, "10.0.0.6", "28AA"))
            .unwrap();

        let xml = snapshot(&[SensorXml::new("DS18B20", "28AA").field("Temperature", "20.0")]);
        let now = Utc::now();
        let summary = dispatch_server(&mut store, &xml, SERVER, &prefs(), now);

        assert_eq!(
            summary,
            DispatchSummary {
                sensors_updated: 1,
                servers_updated: 1,
                failed: 0
            }
        );
        assert!(store.get("t").unwrap().online);
        assert!(store.get("srv").unwrap().online);
        assert!(!store.get("o").unwrap().online);
    }

    #[test]
    fn test_absent_mirror_field_keeps_previous_value() {
        let mut store = DeviceStore::new();
        store
            .insert(DeviceRecord::new_sensor("t", "Attic", SensorFamily::Ds18b20, SERVER, "28AA"))
            .unwrap();
        let full = snapshot(&[SensorXml::new("DS18B20", "28AA")
            .field("Temperature", "20.0")
            .field("UserByte1", "7")
            .field("UserByte2", "9")]);
        dispatch_server(&mut store, &full, SERVER, &prefs(), Utc::now());

        let partial = snapshot(&[SensorXml::new("DS18B20", "28AA")
            .field("Temperature", "21.0")
            .field("UserByte1", "8")]);
        let summary = dispatch_server(&mut store, &partial, SERVER, &prefs(), Utc::now());

        assert_eq!(summary.sensors_updated, 1);
        let device = store.get("t").unwrap();
        assert!(device.online);
        assert_eq!(device.props.mirror.get("UserByte1").map(String::as_str), Some("8"));
        assert_eq!(device.props.mirror.get("UserByte2").map(String::as_str), Some("9"));
    }
}
