//! Conversion configuration loaded from TOML
//!
//! ```toml
//! [csv]
//! separator = ";"
//! quote_mode = "quote_all"
//!
//! [lob]
//! externalize = true
//!
//! [columns.birthday]
//! format = "dd.MM.yyyy"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::converter::LobOptions;
use crate::format::{CsvSettings, LineBreak, QuoteMode, SettingsError};
use crate::inference::FieldHints;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid delimited-text settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("'{field}' must be a single character, got {value:?}")]
    NotACharacter { field: &'static str, value: String },
}

/// `[csv]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvSection {
    pub separator: String,
    pub quote: String,
    /// Defaults to the quote character (doubled-quote escaping)
    pub escape: Option<String>,
    pub quote_mode: QuoteMode,
    pub line_break: LineBreak,
    pub has_headers: bool,
    pub always_trim: bool,
    pub ignore_empty_lines: bool,
    pub fill_missing_trailing_columns_with_null: bool,
    pub remove_surplus_empty_trailing_columns: bool,
    pub line_break_in_data_allowed: bool,
    pub escaped_quote_in_data_allowed: bool,
    pub null_text: String,
}

impl Default for CsvSection {
    fn default() -> Self {
        let defaults = CsvSettings::default();
        Self {
            separator: defaults.separator().to_string(),
            quote: defaults.quote_char().to_string(),
            escape: None,
            quote_mode: defaults.quote_mode(),
            line_break: defaults.line_break(),
            has_headers: true,
            always_trim: defaults.always_trim(),
            ignore_empty_lines: defaults.ignore_empty_lines(),
            fill_missing_trailing_columns_with_null: defaults
                .fill_missing_trailing_columns_with_null(),
            remove_surplus_empty_trailing_columns: defaults
                .remove_surplus_empty_trailing_columns(),
            line_break_in_data_allowed: defaults.line_break_in_data_allowed(),
            escaped_quote_in_data_allowed: defaults.escaped_quote_in_data_allowed(),
            null_text: defaults.null_text().to_string(),
        }
    }
}

/// `[columns.<name>]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSection {
    /// Date pattern or `file`
    pub format: Option<String>,
}

/// Full conversion configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub csv: CsvSection,
    pub lob: LobOptions,
    pub columns: BTreeMap<String, ColumnSection>,
}

impl ConversionConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.as_ref().display(), "conversion config loaded");
        Ok(config)
    }

    /// Validated delimited-text settings from the `[csv]` section
    pub fn csv_settings(&self) -> Result<CsvSettings, ConfigError> {
        let csv = &self.csv;
        let mut builder = CsvSettings::builder()
            .separator(single_char("separator", &csv.separator)?)
            .quote_char(single_char("quote", &csv.quote)?)
            .quote_mode(csv.quote_mode)
            .line_break(csv.line_break)
            .always_trim(csv.always_trim)
            .ignore_empty_lines(csv.ignore_empty_lines)
            .fill_missing_trailing_columns_with_null(csv.fill_missing_trailing_columns_with_null)
            .remove_surplus_empty_trailing_columns(csv.remove_surplus_empty_trailing_columns)
            .line_break_in_data_allowed(csv.line_break_in_data_allowed)
            .escaped_quote_in_data_allowed(csv.escaped_quote_in_data_allowed)
            .null_text(csv.null_text.clone());
        if let Some(escape) = &csv.escape {
            builder = builder.quote_escape_char(single_char("escape", escape)?);
        }
        Ok(builder.build()?)
    }

    /// Format hints from the `[columns]` sections
    pub fn field_hints(&self) -> FieldHints {
        self.columns
            .iter()
            .filter_map(|(name, column)| {
                column
                    .format
                    .as_ref()
                    .map(|format| (name.clone(), format.clone()))
            })
            .collect()
    }
}

/// Accepts one character, or the escapes `\t` and `tab`
fn single_char(field: &'static str, value: &str) -> Result<char, ConfigError> {
    if value == "\\t" || value.eq_ignore_ascii_case("tab") {
        return Ok('\t');
    }
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(ConfigError::NotACharacter {
            field,
            value: value.to_string(),
        }),
    }
}
