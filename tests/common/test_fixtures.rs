//! Test fixtures: details.xml documents and configurations

use owserver_poller::config::{DeviceDefinition, PollerConfig};
use rstest::fixture;

/// Sensor element for [`details_document`]: family tag, ROM ID, fields
pub type SensorFixture<'a> = (&'a str, &'a str, &'a [(&'a str, &'a str)]);

/// Render a details.xml body with the given sensors
pub fn details_document(sensors: &[SensorFixture<'_>]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Devices-Detail-Response xmlns=\"http://www.embeddeddatasystems.com/schema/owserver\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\n\
         <PollCount>118</PollCount>\n\
         <DevicesConnected>",
    );
    xml.push_str(&sensors.len().to_string());
    xml.push_str(
        "</DevicesConnected>\n\
         <LoopTime>1.002</LoopTime>\n\
         <DataErrors>0</DataErrors>\n\
         <VoltagePower>12.14</VoltagePower>\n\
         <DeviceName>OWServer_v2-Enet</DeviceName>\n\
         <HostName>EDSOWSERVER2</HostName>\n\
         <MACAddress>00:04:A3:B8:0F:12</MACAddress>\n\
         <DateTime>2024-03-01 12:00:00</DateTime>\n",
    );
    for (family, rom, fields) in sensors {
        xml.push_str(&format!("<owd_{family} Description=\"test\">\n"));
        xml.push_str(&format!("<Name>{family}</Name>\n<ROMId>{rom}</ROMId>\n"));
        for (name, value) in fields.iter() {
            xml.push_str(&format!("<{name}>{value}</{name}>\n"));
        }
        xml.push_str(&format!("</owd_{family}>\n"));
    }
    xml.push_str("</Devices-Detail-Response>\n");
    xml
}

/// A sensor declaration bound to `server`
pub fn sensor_definition(id: &str, device_type: &str, server: &str, rom: &str) -> DeviceDefinition {
    DeviceDefinition {
        id: id.to_string(),
        name: Some(id.to_string()),
        device_type: device_type.to_string(),
        server: Some(server.to_string()),
        rom_id: Some(rom.to_string()),
        enabled: true,
        temp_compensation: 0.0,
        primary_selector: None,
    }
}

/// A server-device declaration
pub fn server_definition(id: &str, server: &str) -> DeviceDefinition {
    DeviceDefinition {
        id: id.to_string(),
        name: Some(id.to_string()),
        device_type: "server".to_string(),
        server: Some(server.to_string()),
        rom_id: None,
        enabled: true,
        temp_compensation: 0.0,
        primary_selector: None,
    }
}

/// Static-list configuration with defaults everywhere else
#[fixture]
pub fn static_config() -> PollerConfig {
    let mut config = PollerConfig::default();
    config.servers.auto_detect = false;
    config
}
