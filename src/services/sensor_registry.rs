//! Sensor type registry for OWServer hardware families
//!
//! Each supported 1-Wire family is described once here: which XML fields map
//! onto which device states, which "primary value" selectors a user may pick,
//! and which read-back configuration fields are mirrored into device props.
//! The dispatcher is a single generic decoder driven by these tables.

use crate::error::{OwServerError, Result};
use crate::services::unit_converter::Conversion;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// XML element prefix for sensor families
pub const SENSOR_ELEMENT_PREFIX: &str = "owd_";

/// Device type id of the OWServer itself
pub const SERVER_DEVICE_TYPE: &str = "owsOWSServer";

/// Supported 1-Wire hardware families
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SensorFamily {
    Ds18b20,
    Ds18s20,
    Ds2406,
    Ds2408,
    Ds2423,
    Ds2438,
    Ds2450,
    Eds0064,
    Eds0065,
    Eds0066,
    Eds0067,
    Eds0068,
    Eds0070,
    Eds0071,
    Eds0080,
    Eds0082,
    Eds0083,
    Eds0085,
    Eds0090,
}

impl SensorFamily {
    pub const ALL: [SensorFamily; 19] = [
        SensorFamily::Ds18b20,
        SensorFamily::Ds18s20,
        SensorFamily::Ds2406,
        SensorFamily::Ds2408,
        SensorFamily::Ds2423,
        SensorFamily::Ds2438,
        SensorFamily::Ds2450,
        SensorFamily::Eds0064,
        SensorFamily::Eds0065,
        SensorFamily::Eds0066,
        SensorFamily::Eds0067,
        SensorFamily::Eds0068,
        SensorFamily::Eds0070,
        SensorFamily::Eds0071,
        SensorFamily::Eds0080,
        SensorFamily::Eds0082,
        SensorFamily::Eds0083,
        SensorFamily::Eds0085,
        SensorFamily::Eds0090,
    ];

    /// Family name as used in the `owd_<Family>` element tag
    pub fn xml_tag(&self) -> &'static str {
        match self {
            SensorFamily::Ds18b20 => "DS18B20",
            SensorFamily::Ds18s20 => "DS18S20",
            SensorFamily::Ds2406 => "DS2406",
            SensorFamily::Ds2408 => "DS2408",
            SensorFamily::Ds2423 => "DS2423",
            SensorFamily::Ds2438 => "DS2438",
            SensorFamily::Ds2450 => "DS2450",
            SensorFamily::Eds0064 => "EDS0064",
            SensorFamily::Eds0065 => "EDS0065",
            SensorFamily::Eds0066 => "EDS0066",
            SensorFamily::Eds0067 => "EDS0067",
            SensorFamily::Eds0068 => "EDS0068",
            SensorFamily::Eds0070 => "EDS0070",
            SensorFamily::Eds0071 => "EDS0071",
            SensorFamily::Eds0080 => "EDS0080",
            SensorFamily::Eds0082 => "EDS0082",
            SensorFamily::Eds0083 => "EDS0083",
            SensorFamily::Eds0085 => "EDS0085",
            SensorFamily::Eds0090 => "EDS0090",
        }
    }

    /// Device type id used in device definitions
    pub fn device_type_id(&self) -> &'static str {
        match self {
            SensorFamily::Ds18b20 => "owsTemperatureSensor",
            SensorFamily::Ds18s20 => "owsTemperatureSensor_S",
            SensorFamily::Ds2406 => "owsDualSwitchPlusMemory",
            SensorFamily::Ds2408 => "owsUserSwitch",
            SensorFamily::Ds2423 => "owsCounterDevice",
            SensorFamily::Ds2438 => "owsSmartBatteryMonitor",
            SensorFamily::Ds2450 => "owsQuadConverter",
            SensorFamily::Eds0064 => "owsTemperatureSensor64",
            SensorFamily::Eds0065 => "owsTemperatureHumiditySensor65",
            SensorFamily::Eds0066 => "owsTemperaturePressureSensor66",
            SensorFamily::Eds0067 => "owsTemperatureLight",
            SensorFamily::Eds0068 => "owsTemperatureHumidityBarometricPressureLight",
            SensorFamily::Eds0070 => "owsVibrationSensor",
            SensorFamily::Eds0071 => "owsRTDinterfaceFourWire71",
            SensorFamily::Eds0080 => "owsOctalMilliampInput80",
            SensorFamily::Eds0082 => "owsOctalCurrentDevice",
            SensorFamily::Eds0083 => "owsOctalCurrentDevice83",
            SensorFamily::Eds0085 => "owsQuadCurrentDevice",
            SensorFamily::Eds0090 => "owsOctalDiscreteIO90",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SensorFamily::Ds18b20 => "Programmable resolution thermometer",
            SensorFamily::Ds18s20 => "Parasite power thermometer",
            SensorFamily::Ds2406 => "Dual addressable switch plus memory",
            SensorFamily::Ds2408 => "8-channel addressable switch",
            SensorFamily::Ds2423 => "4kb 1-Wire RAM with counter",
            SensorFamily::Ds2438 => "Smart battery monitor",
            SensorFamily::Ds2450 => "Quad A/D converter",
            SensorFamily::Eds0064 => "Temperature sensor",
            SensorFamily::Eds0065 => "Temperature and humidity sensor",
            SensorFamily::Eds0066 => "Temperature and barometric pressure sensor",
            SensorFamily::Eds0067 => "Temperature and light sensor",
            SensorFamily::Eds0068 => "Temperature, humidity, barometric pressure and light sensor",
            SensorFamily::Eds0070 => "Vibration sensor",
            SensorFamily::Eds0071 => "RTD interface, 4 wire",
            SensorFamily::Eds0080 => "Octal 4-20 milliamp input",
            SensorFamily::Eds0082 => "Octal 0-10 volt input",
            SensorFamily::Eds0083 => "Quad 4-20 milliamp input",
            SensorFamily::Eds0085 => "Quad 0-10 volt input",
            SensorFamily::Eds0090 => "Octal discrete IO",
        }
    }

    /// Resolve a family from its XML tag, with or without the `owd_` prefix
    pub fn from_xml_tag(tag: &str) -> Option<Self> {
        let tag = tag.strip_prefix(SENSOR_ELEMENT_PREFIX).unwrap_or(tag);
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.xml_tag().eq_ignore_ascii_case(tag))
    }

    pub fn from_device_type_id(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.device_type_id() == id)
    }

    /// Full element name, e.g. `owd_DS18B20`
    pub fn element_name(&self) -> String {
        format!("{SENSOR_ELEMENT_PREFIX}{}", self.xml_tag())
    }

    /// Selector used when a device does not name one
    pub fn default_selector(&self) -> &'static str {
        match self {
            SensorFamily::Ds2406 => "I_A",
            SensorFamily::Ds2408 => "S_0",
            SensorFamily::Ds2423 | SensorFamily::Ds2450 => "C_A",
            SensorFamily::Eds0070 => "V",
            SensorFamily::Eds0080
            | SensorFamily::Eds0082
            | SensorFamily::Eds0083
            | SensorFamily::Eds0085
            | SensorFamily::Eds0090 => "I_1",
            _ => "T",
        }
    }
}

impl fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.xml_tag())
    }
}

/// Declared type of a configured device
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Server,
    Sensor(SensorFamily),
}

impl DeviceKind {
    pub fn is_server(&self) -> bool {
        matches!(self, DeviceKind::Server)
    }

    pub fn family(&self) -> Option<SensorFamily> {
        match self {
            DeviceKind::Server => None,
            DeviceKind::Sensor(family) => Some(*family),
        }
    }
}

impl std::str::FromStr for DeviceKind {
    type Err = OwServerError;

    /// Accepts a device type id (`owsTemperatureSensor`), a family tag
    /// (`DS18B20`, `owd_DS18B20`) or `server`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == SERVER_DEVICE_TYPE || s.eq_ignore_ascii_case("server") {
            return Ok(DeviceKind::Server);
        }
        SensorFamily::from_device_type_id(s)
            .or_else(|| SensorFamily::from_xml_tag(s))
            .map(DeviceKind::Sensor)
            .ok_or_else(|| OwServerError::config(format!("unknown device type '{s}'")))
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Server => f.write_str("server"),
            DeviceKind::Sensor(family) => write!(f, "{family}"),
        }
    }
}

/// One `{state_key: xml_field}` table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub state_key: String,
    pub xml_field: String,
    pub conversion: Option<Conversion>,
}

/// Image shown for a device after its primary value is set
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StateImage {
    SensorOn,
    SensorOff,
    TemperatureSensor,
    LightSensor,
    Error,
}

/// How the image follows the primary value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRule {
    Fixed(StateImage),
    /// `SensorOn` when the value equals the given string, else `SensorOff`
    OnWhen(&'static str),
}

impl ImageRule {
    pub fn image_for(&self, value: &str) -> StateImage {
        match self {
            ImageRule::Fixed(image) => *image,
            ImageRule::OnWhen(on) if value == *on => StateImage::SensorOn,
            ImageRule::OnWhen(_) => StateImage::SensorOff,
        }
    }
}

/// Where a primary value comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimarySource {
    /// An XML field, optionally run through a unit conversion
    Field {
        xml_field: String,
        conversion: Option<Conversion>,
    },
    /// Bit N of the latch state (bit 0 is the least significant)
    LatchBit(u8),
}

/// One user-selectable primary value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimarySelector {
    pub key: String,
    pub label: String,
    pub source: PrimarySource,
    pub image: ImageRule,
}

/// Everything the decoder needs to know about one family
#[derive(Debug, Clone)]
pub struct FamilySpec {
    pub fields: Vec<FieldMapping>,
    pub selectors: Vec<PrimarySelector>,
    pub mirror: Vec<String>,
    /// Field holding an 8-bit latch that is unpacked into `owsInput1..8`
    pub latch_field: Option<&'static str>,
}

const TEMPERATURE: Conversion = Conversion::Temperature { compensate: true };
const DERIVED_TEMPERATURE: Conversion = Conversion::Temperature { compensate: false };

/// State key for an XML field
pub fn state_key_for(xml_field: &str) -> String {
    match xml_field {
        "ROMId" => "owsRomID".to_string(),
        "Name" => "owsType".to_string(),
        "Counter_A" => "owsCounterA".to_string(),
        "Counter_B" => "owsCounterB".to_string(),
        "RSTZconfiguration" => "owsRSTZConfiguration".to_string(),
        other => format!("ows{other}"),
    }
}

fn alarm_fields(measure: &str) -> Vec<String> {
    let mut fields = Vec::with_capacity(6);
    for level in ["High", "Low"] {
        fields.push(format!("{measure}{level}AlarmState"));
        fields.push(format!("{measure}{level}AlarmValue"));
        fields.push(format!("{measure}{level}ConditionalSearchState"));
    }
    fields
}

fn alarm_thresholds(measure: &str) -> Vec<String> {
    vec![
        format!("{measure}HighAlarmValue"),
        format!("{measure}LowAlarmValue"),
    ]
}

fn measured(measure: &str) -> Vec<String> {
    let mut fields = vec![measure.to_string()];
    fields.extend(alarm_fields(measure));
    fields
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

const COMMON_FIELDS: &[&str] = &[
    "Channel",
    "Family",
    "Health",
    "PrimaryValue",
    "RawData",
    "ROMId",
    "Name",
];

const EDS_FIELDS: &[&str] = &[
    "ClearAlarms",
    "LED",
    "LEDFunction",
    "LEDState",
    "Relay",
    "RelayFunction",
    "RelayState",
    "Version",
];

fn channel_bank(prefix: &str, count: u8) -> Vec<String> {
    let mut fields = Vec::new();
    for n in 1..=count {
        let channel = format!("{prefix}{n}");
        fields.extend(alarm_fields(&channel));
        for suffix in ["Instant", "Maximum", "Minimum"] {
            fields.push(format!("{channel}{suffix}"));
        }
    }
    fields
}

fn discrete_io_bank() -> Vec<String> {
    let mut fields = Vec::new();
    for n in 1..=8u8 {
        let io = format!("DiscreteIO{n}");
        fields.extend(alarm_fields(&io));
        for suffix in [
            "ActivityLatch",
            "ActivityLatchReset",
            "InputState",
            "OutputState",
            "OutputValue",
            "PulldownState",
            "PulldownValue",
        ] {
            fields.push(format!("{io}{suffix}"));
        }
        if n <= 2 {
            fields.push(format!("{io}PulseCounter"));
            fields.push(format!("{io}PulseCounterReset"));
        }
    }
    fields
}

fn field_conversion(xml_field: &str) -> Option<Conversion> {
    (xml_field == "Temperature").then_some(TEMPERATURE)
}

fn mappings(fields: Vec<String>) -> Vec<FieldMapping> {
    let mut mapped: Vec<FieldMapping> = fields
        .into_iter()
        .map(|xml_field| FieldMapping {
            state_key: state_key_for(&xml_field),
            conversion: field_conversion(&xml_field),
            xml_field,
        })
        .collect();
    mapped.sort_by(|a, b| a.state_key.cmp(&b.state_key));
    mapped.dedup_by(|a, b| a.state_key == b.state_key);
    mapped
}

fn select(key: &str, label: &str, xml_field: &str, conversion: Option<Conversion>, image: ImageRule) -> PrimarySelector {
    PrimarySelector {
        key: key.to_string(),
        label: label.to_string(),
        source: PrimarySource::Field {
            xml_field: xml_field.to_string(),
            conversion,
        },
        image,
    }
}

fn temperature_selector() -> PrimarySelector {
    select(
        "T",
        "Temperature",
        "Temperature",
        Some(TEMPERATURE),
        ImageRule::Fixed(StateImage::TemperatureSensor),
    )
}

fn counter_selector(key: &str, xml_field: &str) -> PrimarySelector {
    select(key, xml_field, xml_field, None, ImageRule::Fixed(StateImage::SensorOff))
}

fn led_relay_selectors() -> Vec<PrimarySelector> {
    vec![
        select("LED", "LED", "LED", None, ImageRule::OnWhen("1")),
        select("Relay", "Relay", "Relay", None, ImageRule::OnWhen("1")),
    ]
}

fn input_bank_selectors(prefix: &str, count: u8) -> Vec<PrimarySelector> {
    (1..=count)
        .map(|n| {
            select(
                &format!("I_{n}"),
                &format!("Input {n}"),
                &format!("{prefix}{n}Instant"),
                Some(Conversion::Volts),
                ImageRule::Fixed(StateImage::SensorOff),
            )
        })
        .collect()
}

fn eds_mirror(measures: &[&str]) -> Vec<String> {
    let mut mirror = names(&["LEDFunction", "RelayFunction"]);
    for measure in measures {
        mirror.extend(alarm_thresholds(measure));
    }
    mirror
}

fn build_family(family: SensorFamily) -> FamilySpec {
    let mut fields = names(COMMON_FIELDS);
    let mut selectors = Vec::new();
    let mut mirror = Vec::new();
    let mut latch_field = None;

    match family {
        SensorFamily::Ds18b20 => {
            fields.extend(names(&["PowerSource", "Resolution", "Temperature", "UserByte1", "UserByte2"]));
            selectors.push(temperature_selector());
            mirror = names(&["UserByte1", "UserByte2"]);
        }
        SensorFamily::Ds18s20 => {
            fields.extend(names(&["Temperature", "UserByte1", "UserByte2"]));
            selectors.push(temperature_selector());
            mirror = names(&["UserByte1", "UserByte2"]);
        }
        SensorFamily::Ds2406 => {
            fields.extend(names(&[
                "ActivityLatch_A",
                "ActivityLatch_B",
                "ActivityLatchReset",
                "FlipFlop_A",
                "FlipFlop_B",
                "InputLevel_A",
                "InputLevel_B",
                "NumberOfChannels",
                "PowerSource",
            ]));
            selectors.push(select("I_A", "Input Level A", "InputLevel_A", None, ImageRule::OnWhen("0")));
            selectors.push(select("I_B", "Input Level B", "InputLevel_B", None, ImageRule::OnWhen("0")));
            mirror = names(&["ActivityLatchReset"]);
        }
        SensorFamily::Ds2408 => {
            fields.extend(names(&[
                "PIOActivityLatchState",
                "PIOLogicState",
                "PIOOutputLatchState",
                "PowerOnResetLatch",
                "RSTZconfiguration",
                "VccPowerStatus",
            ]));
            for bit in 0..8u8 {
                selectors.push(PrimarySelector {
                    key: format!("S_{bit}"),
                    label: format!("Switch {bit}"),
                    source: PrimarySource::LatchBit(bit),
                    image: ImageRule::OnWhen("0"),
                });
            }
            mirror = names(&[
                "PIOActivityLatchState",
                "PIOOutputLatchState",
                "PowerOnResetLatch",
                "RSTZconfiguration",
            ]);
            latch_field = Some("PIOOutputLatchState");
        }
        SensorFamily::Ds2423 => {
            fields.extend(names(&["Counter_A", "Counter_B"]));
            selectors.push(counter_selector("C_A", "Counter_A"));
            selectors.push(counter_selector("C_B", "Counter_B"));
        }
        SensorFamily::Ds2438 => {
            fields.extend(names(&["Humidity", "Temperature", "Vad", "Vdd", "Vsense"]));
            selectors.push(temperature_selector());
        }
        SensorFamily::Ds2450 => {
            for channel in ["A", "B", "C", "D"] {
                for suffix in [
                    "ConversionRange",
                    "ConversionResolution",
                    "ConversionValue",
                    "OutputControl",
                    "OutputEnable",
                ] {
                    fields.push(format!("Channel{channel}{suffix}"));
                }
                selectors.push(counter_selector(
                    &format!("C_{channel}"),
                    &format!("Channel{channel}ConversionValue"),
                ));
                for suffix in ["ConversionRange", "ConversionResolution", "OutputControl", "OutputEnable"] {
                    mirror.push(format!("Channel{channel}{suffix}"));
                }
            }
            fields.extend(names(&["PowerOnReset", "VCCControl"]));
            mirror.extend(names(&["PowerOnReset", "VCCControl"]));
        }
        SensorFamily::Eds0064
        | SensorFamily::Eds0065
        | SensorFamily::Eds0066
        | SensorFamily::Eds0067
        | SensorFamily::Eds0068 => {
            fields.extend(names(EDS_FIELDS));
            fields.extend(names(&["Counter1", "Counter2"]));
            let measures: &[&str] = match family {
                SensorFamily::Eds0064 => &["Temperature"],
                SensorFamily::Eds0065 => &["DewPoint", "HeatIndex", "Humidex", "Humidity", "Temperature"],
                SensorFamily::Eds0066 => &["BarometricPressureHg", "BarometricPressureMb", "Temperature"],
                SensorFamily::Eds0067 => &["Light", "Temperature"],
                _ => &[
                    "BarometricPressureHg",
                    "BarometricPressureMb",
                    "DewPoint",
                    "HeatIndex",
                    "Humidex",
                    "Humidity",
                    "Light",
                    "Temperature",
                ],
            };
            for measure in measures {
                fields.extend(measured(measure));
            }
            selectors.push(counter_selector("C_1", "Counter1"));
            selectors.push(counter_selector("C_2", "Counter2"));
            selectors.extend(combo_selectors(family));
            selectors.extend(led_relay_selectors());
            selectors.push(temperature_selector());

            mirror = eds_mirror(measures);
            if family == SensorFamily::Eds0068 {
                for measure in measures {
                    mirror.push(format!("{measure}HighConditionalSearchState"));
                    mirror.push(format!("{measure}LowConditionalSearchState"));
                }
            }
        }
        SensorFamily::Eds0070 => {
            fields.extend(names(EDS_FIELDS));
            fields.push("Counter".to_string());
            fields.extend(alarm_fields("Vibration"));
            fields.extend(names(&["VibrationInstant", "VibrationMaximum", "VibrationMinimum", "VibrationPeak"]));
            selectors.push(counter_selector("C_1", "Counter"));
            selectors.extend(led_relay_selectors());
            selectors.push(counter_selector("V", "VibrationInstant"));
            mirror = eds_mirror(&["Vibration"]);
        }
        SensorFamily::Eds0071 => {
            fields.extend(names(EDS_FIELDS));
            fields.extend(names(&[
                "CalibrationKey",
                "CalibrationValue",
                "ConversionCounter",
                "Counter",
                "RTDFault",
                "RTDFaultConditionalSearchState",
                "RTDOhms",
                "RTDReadDelay",
            ]));
            fields.extend(alarm_fields("RTDResistance"));
            fields.extend(measured("Temperature"));
            selectors.push(counter_selector("C_1", "Counter"));
            selectors.extend(led_relay_selectors());
            selectors.push(select(
                "RTD",
                "RTD Ohms",
                "RTDOhms",
                Some(Conversion::Volts),
                ImageRule::Fixed(StateImage::SensorOff),
            ));
            selectors.push(temperature_selector());
            mirror = eds_mirror(&["RTDResistance", "Temperature"]);
            mirror.extend(names(&["CalibrationKey", "RTDReadDelay"]));
        }
        SensorFamily::Eds0080 | SensorFamily::Eds0082 | SensorFamily::Eds0083 | SensorFamily::Eds0085 => {
            let (prefix, count) = match family {
                SensorFamily::Eds0080 => ("v4to20mAInput", 8),
                SensorFamily::Eds0082 => ("v0to10VoltInput", 8),
                SensorFamily::Eds0083 => ("v4to20mAInput", 4),
                _ => ("v0to10VoltInput", 4),
            };
            fields.extend(names(EDS_FIELDS));
            fields.push("Counter".to_string());
            fields.extend(channel_bank(prefix, count));
            selectors.extend(input_bank_selectors(prefix, count));
            selectors.extend(led_relay_selectors());
            if family == SensorFamily::Eds0080 {
                selectors.push(counter_selector("C_1", "Counter"));
            }
            let channels: Vec<String> = (1..=count).map(|n| format!("{prefix}{n}")).collect();
            let channel_refs: Vec<&str> = channels.iter().map(String::as_str).collect();
            mirror = eds_mirror(&channel_refs);
        }
        SensorFamily::Eds0090 => {
            fields.extend(names(EDS_FIELDS));
            fields.push("Counter".to_string());
            fields.extend(discrete_io_bank());
            selectors.push(counter_selector("C_1", "Counter"));
            for n in 1..=8u8 {
                selectors.push(counter_selector(
                    &format!("I_{n}"),
                    &format!("DiscreteIO{n}InputState"),
                ));
            }
            selectors.extend(led_relay_selectors());
            for n in 1..=8u8 {
                let io = format!("DiscreteIO{n}");
                mirror.push(format!("{io}ActivityLatchReset"));
                mirror.extend(alarm_thresholds(&io));
                mirror.push(format!("{io}OutputState"));
                mirror.push(format!("{io}PulldownState"));
                if n <= 2 {
                    mirror.push(format!("{io}PulseCounterReset"));
                }
            }
            mirror.extend(names(&["LEDFunction", "RelayFunction"]));
        }
    }

    FamilySpec {
        fields: mappings(fields),
        selectors,
        mirror,
        latch_field,
    }
}

/// Humidity, pressure and light selectors of the EDS0065-0068 combo sensors
fn combo_selectors(family: SensorFamily) -> Vec<PrimarySelector> {
    let dew_point = |key: &str| {
        select(key, "Dew Point", "DewPoint", Some(DERIVED_TEMPERATURE), ImageRule::Fixed(StateImage::SensorOff))
    };
    let heat_index = |key: &str| {
        select(key, "Heat Index", "HeatIndex", Some(DERIVED_TEMPERATURE), ImageRule::Fixed(StateImage::SensorOff))
    };
    let humidity = |key: &str| {
        select(key, "Humidity", "Humidity", Some(Conversion::Humidity), ImageRule::Fixed(StateImage::SensorOff))
    };
    let humidex = |key: &str| {
        select(key, "Humidex", "Humidex", Some(Conversion::Humidex), ImageRule::Fixed(StateImage::SensorOff))
    };
    let pressure_hg = |key: &str| {
        select(
            key,
            "Barometric Pressure (inHg)",
            "BarometricPressureHg",
            Some(Conversion::Pressure),
            ImageRule::Fixed(StateImage::SensorOff),
        )
    };
    let pressure_mb = |key: &str| {
        select(
            key,
            "Barometric Pressure (mb)",
            "BarometricPressureMb",
            Some(Conversion::Pressure),
            ImageRule::Fixed(StateImage::SensorOff),
        )
    };
    let light = || select("IL", "Light", "Light", None, ImageRule::Fixed(StateImage::LightSensor));

    match family {
        SensorFamily::Eds0065 => vec![dew_point("DP"), humidity("Hu"), humidex("Hx"), heat_index("HI")],
        SensorFamily::Eds0066 => vec![pressure_hg("BPH"), pressure_mb("BPM")],
        SensorFamily::Eds0067 => vec![light()],
        SensorFamily::Eds0068 => vec![
            pressure_hg("BH"),
            pressure_mb("BM"),
            dew_point("DP"),
            heat_index("HI"),
            humidex("HX"),
            humidity("HY"),
            light(),
        ],
        _ => Vec::new(),
    }
}

static FAMILY_SPECS: Lazy<HashMap<SensorFamily, FamilySpec>> = Lazy::new(|| {
    SensorFamily::ALL
        .iter()
        .map(|family| (*family, build_family(*family)))
        .collect()
});

static SERVER_FIELDS: Lazy<Vec<FieldMapping>> = Lazy::new(|| {
    let mut fields = mappings(names(&[
        "DataErrors",
        "DataErrorsChannel1",
        "DataErrorsChannel2",
        "DataErrorsChannel3",
        "DateTime",
        "DeviceName",
        "DevicesConnected",
        "DevicesConnectedChannel1",
        "DevicesConnectedChannel2",
        "DevicesConnectedChannel3",
        "HostName",
        "LoopTime",
        "MACAddress",
        "PollCount",
        "VoltageChannel1",
        "VoltageChannel2",
        "VoltageChannel3",
        "VoltagePower",
    ]));
    // The server has no ROM ID; its host name stands in for it
    fields.push(FieldMapping {
        state_key: "owsRomID".to_string(),
        xml_field: "HostName".to_string(),
        conversion: None,
    });
    fields.sort_by(|a, b| a.state_key.cmp(&b.state_key));
    fields
});

/// Registry facade over the static family tables
pub struct SensorTypeRegistry;

impl SensorTypeRegistry {
    /// Full description of a family
    pub fn family(family: SensorFamily) -> &'static FamilySpec {
        // Every variant is inserted when the table is built
        &FAMILY_SPECS[&family]
    }

    /// Ordered `{state_key: xml_field}` table for a device kind
    pub fn field_mapping(kind: DeviceKind) -> &'static [FieldMapping] {
        match kind {
            DeviceKind::Server => SERVER_FIELDS.as_slice(),
            DeviceKind::Sensor(family) => Self::family(family).fields.as_slice(),
        }
    }

    /// Resolve a user's primary value preference. Unknown keys yield `None`.
    pub fn primary_value_selector(family: SensorFamily, key: &str) -> Option<&'static PrimarySelector> {
        Self::family(family).selectors.iter().find(|s| s.key == key)
    }

    /// Read-back configuration fields mirrored into device props
    pub fn mirror_fields(family: SensorFamily) -> &'static [String] {
        Self::family(family).mirror.as_slice()
    }

    /// All selector keys accepted for a family
    pub fn selector_keys(family: SensorFamily) -> Vec<&'static str> {
        Self::family(family)
            .selectors
            .iter()
            .map(|s| s.key.as_str())
            .collect()
    }
}
