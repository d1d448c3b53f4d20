//! Unit conversion for raw OWServer readings
//!
//! The hardware reports every numeric value as a decimal string in metric
//! units. These helpers turn a raw string into the display string the device
//! store keeps, honoring the configured temperature unit and per-quantity
//! decimal precision.

use crate::error::{OwServerError, Result};
use serde::{Deserialize, Serialize};

/// Display unit for temperatures
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TemperatureUnit {
    #[serde(rename = "C", alias = "celsius", alias = "Celsius")]
    Celsius,
    #[default]
    #[serde(rename = "F", alias = "fahrenheit", alias = "Fahrenheit")]
    Fahrenheit,
}

impl std::str::FromStr for TemperatureUnit {
    type Err = OwServerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "C" | "CELSIUS" => Ok(TemperatureUnit::Celsius),
            "F" | "FAHRENHEIT" => Ok(TemperatureUnit::Fahrenheit),
            other => Err(OwServerError::config(format!(
                "unknown temperature unit '{other}' (expected C or F)"
            ))),
        }
    }
}

/// User preferences for unit display
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UnitPreferences {
    pub temperature: TemperatureUnit,
    pub temperature_decimals: usize,
    pub humidity_decimals: usize,
    pub humidex_decimals: usize,
    pub pressure_decimals: usize,
    pub volts_decimals: usize,
}

impl Default for UnitPreferences {
    fn default() -> Self {
        Self {
            temperature: TemperatureUnit::Fahrenheit,
            temperature_decimals: 1,
            humidity_decimals: 1,
            humidex_decimals: 1,
            pressure_decimals: 1,
            volts_decimals: 1,
        }
    }
}

/// Kind of conversion applied to a raw reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Celsius reading converted to the display unit. Measured temperatures
    /// get the device compensation offset first; derived ones (dew point,
    /// heat index) do not.
    Temperature { compensate: bool },
    Humidity,
    Humidex,
    Pressure,
    Volts,
}

/// Parse a raw numeric field
pub fn parse_raw(field: &str, raw: &str) -> Result<f64> {
    raw.trim().parse::<f64>().map_err(|_| {
        OwServerError::field_decode(format!("{field}: '{raw}' is not a number"))
    })
}

fn format_decimals(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, value)
}

/// Convert a Celsius reading (already compensated) to the display unit
pub fn temperature(celsius: f64, prefs: &UnitPreferences) -> String {
    let value = match prefs.temperature {
        TemperatureUnit::Celsius => celsius,
        TemperatureUnit::Fahrenheit => celsius * 1.8 + 32.0,
    };
    format_decimals(value, prefs.temperature_decimals)
}

pub fn humidity(value: f64, prefs: &UnitPreferences) -> String {
    format_decimals(value, prefs.humidity_decimals)
}

pub fn humidex(value: f64, prefs: &UnitPreferences) -> String {
    format_decimals(value, prefs.humidex_decimals)
}

pub fn pressure(value: f64, prefs: &UnitPreferences) -> String {
    format_decimals(value, prefs.pressure_decimals)
}

pub fn volts(value: f64, prefs: &UnitPreferences) -> String {
    format_decimals(value, prefs.volts_decimals)
}

/// Apply a conversion to a raw field string.
///
/// `compensation` is only added for [`Conversion::Temperature`] with
/// `compensate: true`; derived temperatures such as dew point are converted
/// from the raw value as reported.
pub fn convert(
    field: &str,
    raw: &str,
    conversion: Conversion,
    compensation: f64,
    prefs: &UnitPreferences,
) -> Result<String> {
    let value = parse_raw(field, raw)?;
    let converted = match conversion {
        Conversion::Temperature { compensate: true } => temperature(value + compensation, prefs),
        Conversion::Temperature { compensate: false } => temperature(value, prefs),
        Conversion::Humidity => humidity(value, prefs),
        Conversion::Humidex => humidex(value, prefs),
        Conversion::Pressure => pressure(value, prefs),
        Conversion::Volts => volts(value, prefs),
    };
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn prefs(unit: TemperatureUnit, decimals: usize) -> UnitPreferences {
        UnitPreferences {
            temperature: unit,
            temperature_decimals: decimals,
            ..Default::default()
        }
    }

    #[rstest]
    #[case("20.0", 0.0, TemperatureUnit::Fahrenheit, 1, "68.0")]
    #[case("20.0", 0.0, TemperatureUnit::Celsius, 1, "20.0")]
    #[case("-40", 0.0, TemperatureUnit::Fahrenheit, 0, "-40")]
    #[case("21.5", -1.5, TemperatureUnit::Celsius, 2, "20.00")]
    #[case("100", 0.0, TemperatureUnit::Fahrenheit, 1, "212.0")]
    fn test_temperature_conversion(
        #[case] raw: &str,
        #[case] comp: f64,
        #[case] unit: TemperatureUnit,
        #[case] decimals: usize,
        #[case] expected: &str,
    ) {
        let result = convert(
            "Temperature",
            raw,
            Conversion::Temperature { compensate: true },
            comp,
            &prefs(unit, decimals),
        )
        .unwrap();
        assert_eq!(result, expected);
    }

    #[test]
    fn test_derived_temperature_ignores_compensation() {
        let p = prefs(TemperatureUnit::Celsius, 1);
        let result = convert(
            "DewPoint",
            "10.26",
            Conversion::Temperature { compensate: false },
            5.0,
            &p,
        )
        .unwrap();
        assert_eq!(result, "10.3");
    }

    #[test]
    fn test_precision_per_quantity() {
        let p = UnitPreferences {
            humidity_decimals: 0,
            pressure_decimals: 2,
            volts_decimals: 3,
            humidex_decimals: 1,
            ..Default::default()
        };
        assert_eq!(convert("Humidity", "45.61", Conversion::Humidity, 0.0, &p).unwrap(), "46");
        assert_eq!(convert("P", "1013.2", Conversion::Pressure, 0.0, &p).unwrap(), "1013.20");
        assert_eq!(convert("V", " 4.5 ", Conversion::Volts, 0.0, &p).unwrap(), "4.500");
        assert_eq!(convert("Hx", "31", Conversion::Humidex, 0.0, &p).unwrap(), "31.0");
    }

    #[test]
    fn test_malformed_value_is_field_error() {
        let err = convert("Humidity", "n/a", Conversion::Humidity, 0.0, &Default::default())
            .unwrap_err();
        assert!(matches!(err, OwServerError::FieldDecode(_)));
    }

    #[rstest]
    #[case("c", TemperatureUnit::Celsius)]
    #[case("F", TemperatureUnit::Fahrenheit)]
    #[case(" fahrenheit ", TemperatureUnit::Fahrenheit)]
    fn test_unit_from_str(#[case] input: &str, #[case] expected: TemperatureUnit) {
        assert_eq!(input.parse::<TemperatureUnit>().unwrap(), expected);
    }

    #[test]
    fn test_unit_from_str_rejects_kelvin() {
        assert!("K".parse::<TemperatureUnit>().is_err());
    }
}
