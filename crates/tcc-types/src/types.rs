//! Core types for daemon and liquid-cooler data.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// Highest accepted fan or pump duty cycle, in percent.
pub const MAX_DUTY_CYCLE: u8 = 100;

/// An 8-bit RGB color as used by the cooler LED.
///
/// Converts to and from the `#rrggbb` notation used by color pickers:
///
/// ```
/// use tcc_types::Rgb;
///
/// let color: Rgb = "#ff8000".parse().unwrap();
/// assert_eq!(color, Rgb::new(255, 128, 0));
/// assert_eq!(color.to_hex(), "#ff8000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rgb {
    /// Red channel.
    pub red: u8,
    /// Green channel.
    pub green: u8,
    /// Blue channel.
    pub blue: u8,
}

impl Rgb {
    /// Pure white.
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    /// Create a color from its channels.
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Format as lowercase `#rrggbb`.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }

    /// Parse a `#rrggbb` string. The leading `#` is required.
    pub fn from_hex(hex: &str) -> ParseResult<Self> {
        let digits = hex
            .strip_prefix('#')
            .filter(|d| d.len() == 6 && d.is_ascii())
            .ok_or_else(|| ParseError::InvalidColor(hex.to_string()))?;

        let channel = |range: core::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| ParseError::InvalidColor(hex.to_string()))
        };

        Ok(Self {
            red: channel(0..2)?,
            green: channel(2..4)?,
            blue: channel(4..6)?,
        })
    }
}

impl FromStr for Rgb {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Full state of a liquid-cooling peripheral as reported by `getState`.
///
/// The wire representation uses camelCase keys (`ledOn`, `fanDutyCycle`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct AquarisState {
    /// LED enabled.
    pub led_on: bool,
    /// LED red channel.
    pub red: u8,
    /// LED green channel.
    pub green: u8,
    /// LED blue channel.
    pub blue: u8,
    /// Device-specific LED animation mode.
    pub led_mode: u8,
    /// Fan enabled.
    pub fan_on: bool,
    /// Fan duty cycle in percent.
    pub fan_duty_cycle: u8,
    /// Pump enabled.
    pub pump_on: bool,
    /// Pump duty cycle in percent.
    pub pump_duty_cycle: u8,
    /// Device-specific pump voltage setting.
    pub pump_voltage: u8,
}

impl AquarisState {
    /// The LED color as an [`Rgb`] value.
    pub fn color(&self) -> Rgb {
        Rgb::new(self.red, self.green, self.blue)
    }
}

impl fmt::Display for AquarisState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let on_off = |on: bool| if on { "on" } else { "off" };
        write!(
            f,
            "led {} {} mode {}, fan {} {}%, pump {} {}% voltage {}",
            on_off(self.led_on),
            self.color(),
            self.led_mode,
            on_off(self.fan_on),
            self.fan_duty_cycle,
            on_off(self.pump_on),
            self.pump_duty_cycle,
            self.pump_voltage
        )
    }
}

/// A timestamped sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimeData {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Sampled value.
    pub data: f64,
}

/// Fan speed and temperature samples for one fan.
///
/// The default value (all zeros) is what accessors report when the daemon
/// cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FanData {
    /// Fan speed in percent.
    pub speed: TimeData,
    /// Sensor temperature in degrees Celsius.
    pub temp: TimeData,
}

/// Battery charge type as exposed by the power-supply sysfs interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum ChargeType {
    /// Unknown or unreadable.
    #[default]
    Unknown,
    /// Not applicable to this battery.
    #[cfg_attr(feature = "serde", serde(rename = "N/A"))]
    NotApplicable,
    /// Trickle charging.
    Trickle,
    /// Fast charging.
    Fast,
    /// Standard charging.
    Standard,
    /// Adaptive charging.
    Adaptive,
    /// Custom thresholds.
    Custom,
    /// Charging limited for battery longevity.
    #[cfg_attr(feature = "serde", serde(rename = "Long Life"))]
    LongLife,
    /// Battery bypassed, running from AC.
    Bypass,
}

impl ChargeType {
    /// The sysfs string for this charge type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeType::Unknown => "Unknown",
            ChargeType::NotApplicable => "N/A",
            ChargeType::Trickle => "Trickle",
            ChargeType::Fast => "Fast",
            ChargeType::Standard => "Standard",
            ChargeType::Adaptive => "Adaptive",
            ChargeType::Custom => "Custom",
            ChargeType::LongLife => "Long Life",
            ChargeType::Bypass => "Bypass",
        }
    }
}

impl FromStr for ChargeType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Unknown" => Ok(ChargeType::Unknown),
            "N/A" => Ok(ChargeType::NotApplicable),
            "Trickle" => Ok(ChargeType::Trickle),
            "Fast" => Ok(ChargeType::Fast),
            "Standard" => Ok(ChargeType::Standard),
            "Adaptive" => Ok(ChargeType::Adaptive),
            "Custom" => Ok(ChargeType::Custom),
            "Long Life" => Ok(ChargeType::LongLife),
            "Bypass" => Ok(ChargeType::Bypass),
            other => Err(ParseError::UnknownChargeType(other.to_string())),
        }
    }
}

impl fmt::Display for ChargeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A display resolution with its supported refresh rates.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct DisplayMode {
    /// Refresh rates in Hz.
    pub refresh_rates: Vec<f64>,
    /// Horizontal resolution.
    pub x_resolution: u32,
    /// Vertical resolution.
    pub y_resolution: u32,
}

/// The mode a display is currently driven in.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct ActiveDisplayMode {
    /// Current refresh rate in Hz.
    pub refresh_rate: f64,
    /// Horizontal resolution.
    pub x_resolution: u32,
    /// Vertical resolution.
    pub y_resolution: u32,
}

/// Refresh-rate and resolution information for one display.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct DisplayFreqRes {
    /// Output name, e.g. `eDP-1`.
    pub display_name: String,
    /// Mode currently in use.
    pub active_mode: ActiveDisplayMode,
    /// Every mode the display supports.
    pub display_modes: Vec<DisplayMode>,
}

/// One ODM power limit (TDP) slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TdpInfo {
    /// Lowest accepted value in watts.
    pub min: u32,
    /// Highest accepted value in watts.
    pub max: u32,
    /// Currently configured value in watts.
    pub current: u32,
    /// Human-readable slot name.
    pub descriptor: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_hex() {
        assert_eq!(Rgb::new(255, 0, 0).to_hex(), "#ff0000");
        assert_eq!(Rgb::new(0, 0x0a, 0xbc).to_string(), "#000abc");
        assert_eq!(Rgb::from_hex("#FFfF00").unwrap(), Rgb::new(255, 255, 0));
    }

    #[test]
    fn test_rgb_rejects_malformed() {
        assert!(Rgb::from_hex("ff0000").is_err());
        assert!(Rgb::from_hex("#ff00").is_err());
        assert!(Rgb::from_hex("#gg0000").is_err());
        assert!(Rgb::from_hex("#ff00001").is_err());
        assert!(Rgb::from_hex("#ff00é").is_err());
    }

    #[test]
    fn test_aquaris_state_color_and_display() {
        let state = AquarisState {
            led_on: true,
            red: 255,
            led_mode: 1,
            fan_on: true,
            fan_duty_cycle: 40,
            ..Default::default()
        };
        assert_eq!(state.color(), Rgb::new(255, 0, 0));
        let text = state.to_string();
        assert!(text.contains("led on #ff0000 mode 1"));
        assert!(text.contains("fan on 40%"));
        assert!(text.contains("pump off"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_aquaris_state_wire_format() {
        let json = r#"{
            "ledOn": true, "red": 1, "green": 2, "blue": 3, "ledMode": 2,
            "fanOn": false, "fanDutyCycle": 0,
            "pumpOn": true, "pumpDutyCycle": 60, "pumpVoltage": 1
        }"#;
        let state: AquarisState = serde_json::from_str(json).unwrap();
        assert!(state.led_on);
        assert_eq!(state.color(), Rgb::new(1, 2, 3));
        assert_eq!(state.pump_duty_cycle, 60);

        let value = serde_json::to_value(state).unwrap();
        assert_eq!(value["pumpVoltage"], 1);
        assert_eq!(value["ledMode"], 2);
    }

    #[test]
    fn test_charge_type_strings() {
        assert_eq!("Long Life".parse::<ChargeType>().unwrap(), ChargeType::LongLife);
        assert_eq!("N/A".parse::<ChargeType>().unwrap(), ChargeType::NotApplicable);
        assert_eq!(ChargeType::Bypass.to_string(), "Bypass");
        assert_eq!(ChargeType::default(), ChargeType::Unknown);
        assert!("Turbo".parse::<ChargeType>().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_charge_type_serde_names() {
        let json = serde_json::to_string(&ChargeType::LongLife).unwrap();
        assert_eq!(json, "\"Long Life\"");
        let parsed: ChargeType = serde_json::from_str("\"N/A\"").unwrap();
        assert_eq!(parsed, ChargeType::NotApplicable);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_display_modes_tolerate_missing_fields() {
        let json = r#"[{"displayName": "eDP-1", "activeMode": {"refreshRate": 165,
            "xResolution": 2560, "yResolution": 1600},
            "displayModes": [{"refreshRates": [60, 165], "xResolution": 2560, "yResolution": 1600}]},
            {"displayName": "HDMI-1"}]"#;
        let modes: Vec<DisplayFreqRes> = serde_json::from_str(json).unwrap();
        assert_eq!(modes.len(), 2);
        assert_eq!(modes[0].display_modes[0].refresh_rates, vec![60.0, 165.0]);
        assert!(modes[1].display_modes.is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_fan_data_default_shape() {
        let json = r#"{"speed": {"timestamp": 1700000000000, "data": 42},
            "temp": {"timestamp": 1700000000000, "data": 61.5}}"#;
        let data: FanData = serde_json::from_str(json).unwrap();
        assert_eq!(data.speed.data, 42.0);
        assert_eq!(FanData::default().temp.data, 0.0);
    }
}
