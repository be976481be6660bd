use std::fmt;

use crate::error::EngineError;

pub const CUSTOM_SIZE_CHOICE: &str = "Custom size";
pub const SIZE_PRESETS: [&str; 3] = ["1152x768", "1024x1024", "768x1152"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Parses `<width>x<height>` with positive integers on both sides.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let invalid = || {
            EngineError::Validation(format!(
                "Invalid size '{}'. Use WIDTHxHEIGHT, e.g. 1024x1024.",
                raw.trim()
            ))
        };
        let (width, height) = raw.trim().split_once('x').ok_or_else(invalid)?;
        let width = parse_dimension(width).ok_or_else(invalid)?;
        let height = parse_dimension(height).ok_or_else(invalid)?;
        Ok(Self { width, height })
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn parse_dimension(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<u32>().ok().filter(|value| *value > 0)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeChoice {
    Preset(String),
    Custom(String),
}

impl SizeChoice {
    /// Maps a size dropdown plus its free-text companion field.
    pub fn from_form(choice: &str, custom: Option<&str>) -> Self {
        if choice.trim() == CUSTOM_SIZE_CHOICE {
            Self::Custom(custom.unwrap_or_default().to_string())
        } else {
            Self::Preset(choice.to_string())
        }
    }

    pub fn resolve(&self) -> Result<Resolution, EngineError> {
        match self {
            Self::Preset(value) => Resolution::parse(value),
            Self::Custom(value) if value.trim().is_empty() => Err(EngineError::Validation(
                "Please enter a custom size.".to_string(),
            )),
            Self::Custom(value) => Resolution::parse(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_parse() {
        for preset in SIZE_PRESETS {
            assert!(SizeChoice::Preset(preset.to_string()).resolve().is_ok());
        }
        assert_eq!(
            Resolution::parse("1152x768").ok(),
            Some(Resolution { width: 1152, height: 768 })
        );
    }

    #[test]
    fn malformed_sizes_are_validation_errors() {
        for raw in ["1024", "1024x", "x768", "0x768", "-5x5", "axb", "1x2x3", "+5x5", "1024X768"] {
            let err = Resolution::parse(raw).err();
            assert!(
                matches!(err, Some(EngineError::Validation(_))),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn custom_choice_requires_text() {
        let blank = SizeChoice::from_form("Custom size", Some("  "));
        assert!(matches!(blank.resolve(), Err(EngineError::Validation(message)) if message == "Please enter a custom size."));
        let missing = SizeChoice::from_form("Custom size", None);
        assert!(missing.resolve().is_err());

        let custom = SizeChoice::from_form("Custom size", Some(" 640 x 480 "));
        assert_eq!(custom, SizeChoice::Custom(" 640 x 480 ".to_string()));
        assert_eq!(custom.resolve().ok().map(|size| size.to_string()), Some("640x480".to_string()));
    }

    #[test]
    fn preset_choice_ignores_custom_field() {
        let choice = SizeChoice::from_form("768x1152", Some("1x1"));
        assert_eq!(choice, SizeChoice::Preset("768x1152".to_string()));
    }
}
