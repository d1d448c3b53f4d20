//! Parser for the OWServer `details.xml` document
//!
//! The document has a flat shape: the root's direct children are either
//! server fields (`<DevicesConnected>3</DevicesConnected>`) or sensor
//! elements tagged `owd_<Family>`, each holding its own field children.
//! Element names are matched on their local name so the
//! `http://www.embeddeddatasystems.com/schema/owserver` namespace, default
//! or prefixed, is transparent.

use crate::error::{OwServerError, Result};
use crate::services::sensor_registry::{SensorFamily, SENSOR_ELEMENT_PREFIX};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::collections::HashMap;

/// Namespace used by every OWServer element
pub const OWSERVER_NAMESPACE: &str = "http://www.embeddeddatasystems.com/schema/owserver";

/// One `owd_<Family>` element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorElement {
    /// Family part of the tag, e.g. `DS18B20`
    pub family_tag: String,
    /// Known family, if the tag is one we decode
    pub family: Option<SensorFamily>,
    pub fields: HashMap<String, String>,
}

impl SensorElement {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn rom_id(&self) -> Option<&str> {
        self.field("ROMId")
    }
}

/// Parsed details document for one server and one poll cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlSnapshot {
    pub root: String,
    pub server_fields: HashMap<String, String>,
    pub sensors: Vec<SensorElement>,
}

impl XmlSnapshot {
    pub fn server_field(&self, name: &str) -> Option<&str> {
        self.server_fields.get(name).map(String::as_str)
    }

    /// All elements of one family, in document order
    pub fn sensors_of(&self, family: SensorFamily) -> impl Iterator<Item = &SensorElement> {
        self.sensors.iter().filter(move |s| s.family == Some(family))
    }

    /// First element of `family` whose ROM ID matches
    pub fn find_sensor(&self, family: SensorFamily, rom_id: &str) -> Option<&SensorElement> {
        self.sensors_of(family).find(|s| s.rom_id() == Some(rom_id))
    }

    /// Sorted ROM IDs of every sensor element, known family or not
    pub fn rom_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sensors
            .iter()
            .filter_map(|s| s.rom_id().map(str::to_string))
            .collect();
        ids.sort();
        ids
    }
}

enum Frame {
    Root,
    ServerField(String),
    Sensor,
    SensorField(String),
    Ignored,
}

/// Parse a `details.xml` body into a snapshot
pub fn parse_details(xml: &str) -> Result<XmlSnapshot> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut snapshot = XmlSnapshot::default();
    let mut stack: Vec<Frame> = Vec::new();
    let mut current_sensor: Option<SensorElement> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let frame = open_frame(&mut snapshot, stack.last(), &name, &mut current_sensor)?;
                stack.push(frame);
                text.clear();
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let frame = open_frame(&mut snapshot, stack.last(), &name, &mut current_sensor)?;
                close_frame(frame, String::new(), &mut snapshot, &mut current_sensor);
            }
            Event::Text(t) => {
                text.push_str(&t.unescape()?);
            }
            Event::CData(t) => {
                text.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            Event::End(_) => {
                if let Some(frame) = stack.pop() {
                    close_frame(frame, std::mem::take(&mut text), &mut snapshot, &mut current_sensor);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if snapshot.root.is_empty() {
        return Err(OwServerError::parsing("details.xml has no root element"));
    }
    if !stack.is_empty() {
        return Err(OwServerError::parsing("details.xml ended inside an open element"));
    }

    Ok(snapshot)
}

fn open_frame(
    snapshot: &mut XmlSnapshot,
    parent: Option<&Frame>,
    name: &str,
    current_sensor: &mut Option<SensorElement>,
) -> Result<Frame> {
    let frame = match parent {
        None => {
            if !snapshot.root.is_empty() {
                return Err(OwServerError::parsing(format!(
                    "unexpected second root element <{name}>"
                )));
            }
            snapshot.root = name.to_string();
            Frame::Root
        }
        Some(Frame::Root) => match name.strip_prefix(SENSOR_ELEMENT_PREFIX) {
            Some(family_tag) => {
                *current_sensor = Some(SensorElement {
                    family_tag: family_tag.to_string(),
                    family: SensorFamily::from_xml_tag(family_tag),
                    fields: HashMap::new(),
                });
                Frame::Sensor
            }
            None => Frame::ServerField(name.to_string()),
        },
        Some(Frame::Sensor) => Frame::SensorField(name.to_string()),
        Some(_) => Frame::Ignored,
    };
    Ok(frame)
}

fn close_frame(
    frame: Frame,
    text: String,
    snapshot: &mut XmlSnapshot,
    current_sensor: &mut Option<SensorElement>,
) {
    match frame {
        Frame::ServerField(name) => {
            snapshot.server_fields.entry(name).or_insert(text);
        }
        Frame::SensorField(name) => {
            if let Some(sensor) = current_sensor.as_mut() {
                sensor.fields.entry(name).or_insert(text);
            }
        }
        Frame::Sensor => {
            if let Some(sensor) = current_sensor.take() {
                snapshot.sensors.push(sensor);
            }
        }
        Frame::Root | Frame::Ignored => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Devices-Detail-Response xmlns="http://www.embeddeddatasystems.com/schema/owserver" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<PollCount>42</PollCount>
<DevicesConnected>2</DevicesConnected>
<MACAddress>00:04:A3:00:00:01</MACAddress>
<owd_DS18B20 Description="Programmable resolution thermometer">
<Name>DS18B20</Name>
<Family>28</Family>
<ROMId>5D000003C74F4528</ROMId>
<Temperature Units="Centigrade">20.0</Temperature>
<UserByte1 Writable="True">0</UserByte1>
<UserByte2 Writable="True"/>
</owd_DS18B20>
<owd_DS9999>
<ROMId>0100000000000001</ROMId>
</owd_DS9999>
</Devices-Detail-Response>"#;

    #[test]
    fn test_parse_sample() {
        let snapshot = parse_details(SAMPLE).unwrap();
        assert_eq!(snapshot.root, "Devices-Detail-Response");
        assert_eq!(snapshot.server_field("PollCount"), Some("42"));
        assert_eq!(snapshot.server_field("MACAddress"), Some("00:04:A3:00:00:01"));
        assert_eq!(snapshot.sensors.len(), 2);

        let sensor = snapshot
            .find_sensor(SensorFamily::Ds18b20, "5D000003C74F4528")
            .unwrap();
        assert_eq!(sensor.field("Temperature"), Some("20.0"));
        assert_eq!(sensor.field("UserByte2"), Some(""));
        assert_eq!(sensor.family_tag, "DS18B20");

        let unknown = &snapshot.sensors[1];
        assert_eq!(unknown.family, None);
        assert_eq!(unknown.family_tag, "DS9999");
    }

    #[test]
    fn test_rom_ids_sorted_across_families() {
        let snapshot = parse_details(SAMPLE).unwrap();
        assert_eq!(
            snapshot.rom_ids(),
            vec!["0100000000000001".to_string(), "5D000003C74F4528".to_string()]
        );
    }

    #[test]
    fn test_prefixed_namespace() {
        let xml = r#"<ows:Devices-Detail-Response xmlns:ows="http://www.embeddeddatasystems.com/schema/owserver">
            <ows:DevicesConnected>1</ows:DevicesConnected>
            <ows:owd_DS2423><ows:ROMId>AA</ows:ROMId><ows:Counter_A>7</ows:Counter_A></ows:owd_DS2423>
        </ows:Devices-Detail-Response>"#;
        let snapshot = parse_details(xml).unwrap();
        assert_eq!(snapshot.server_field("DevicesConnected"), Some("1"));
        let sensor = snapshot.find_sensor(SensorFamily::Ds2423, "AA").unwrap();
        assert_eq!(sensor.field("Counter_A"), Some("7"));
    }

    #[test]
    fn test_escaped_text() {
        let xml = "<r><DeviceName>Barn &amp; Shed</DeviceName></r>";
        let snapshot = parse_details(xml).unwrap();
        assert_eq!(snapshot.server_field("DeviceName"), Some("Barn & Shed"));
    }

    #[test]
    fn test_malformed_documents_fail() {
        assert!(parse_details("").is_err());
        assert!(parse_details("not xml at all").is_err());
        assert!(parse_details("<r><PollCount>1</Oops></r>").is_err());
        assert!(parse_details("<r><PollCount>1</PollCount>").is_err());
    }

    #[test]
    fn test_first_duplicate_field_wins() {
        let xml = "<r><owd_DS18B20><ROMId>A</ROMId><Temperature>1</Temperature><Temperature>2</Temperature></owd_DS18B20></r>";
        let snapshot = parse_details(xml).unwrap();
        assert_eq!(snapshot.sensors[0].field("Temperature"), Some("1"));
    }
}
