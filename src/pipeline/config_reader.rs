use crate::pipeline::*;

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// The header names accepted for each field of an appointment.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub name: Vec<String>,
    pub position: Vec<String>,
    pub organization: Vec<String>,
    pub year: Vec<String>,
    pub reappointed: Vec<String>,
}

impl ColumnMapping {
    /// The column names written by the pipeline itself.
    pub fn canonical() -> ColumnMapping {
        ColumnMapping {
            name: vec![NAME_COLUMN.to_string()],
            position: vec![POSITION_COLUMN.to_string()],
            organization: vec![ORG_COLUMN.to_string()],
            year: vec![YEAR_COLUMN.to_string()],
            reappointed: vec![REAPPOINTED_COLUMN.to_string()],
        }
    }
}

fn strings(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnMapping {
    fn default() -> Self {
        ColumnMapping {
            name: strings(&["name"]),
            position: strings(&["position", "appointment"]),
            organization: strings(&["org", "organization", "department"]),
            year: strings(&["year"]),
            reappointed: strings(&["reappointed", "reappointment"]),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationSettings {
    pub prefixes: Vec<String>,
    pub suffixes: Vec<String>,
}

impl Default for NormalizationSettings {
    fn default() -> Self {
        let rules = NormalizationRules::default();
        NormalizationSettings {
            prefixes: rules.prefixes,
            suffixes: rules.suffixes,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    #[serde(rename = "rawDataDirectory")]
    pub raw_data_directory: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: String,
    #[serde(rename = "firstYear")]
    pub first_year: i32,
    #[serde(rename = "lastYear")]
    pub last_year: i32,
    pub columns: ColumnMapping,
    pub normalization: NormalizationSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            raw_data_directory: "raw_data".to_string(),
            output_directory: "analysis_data".to_string(),
            first_year: 2013,
            last_year: 2024,
            columns: ColumnMapping::default(),
            normalization: NormalizationSettings::default(),
        }
    }
}

impl PipelineConfig {
    pub fn years(&self) -> RangeInclusive<i32> {
        self.first_year..=self.last_year
    }

    pub fn normalization_rules(&self) -> NormalizationRules {
        NormalizationRules::new(&self.normalization.prefixes, &self.normalization.suffixes)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        ensure!(
            self.first_year <= self.last_year,
            InvalidConfigSnafu {
                message: format!(
                    "firstYear ({}) is after lastYear ({})",
                    self.first_year, self.last_year
                )
            }
        );
        let required = [
            ("name", &self.columns.name),
            ("position", &self.columns.position),
            ("organization", &self.columns.organization),
            ("year", &self.columns.year),
        ];
        for (field, accepted) in required.iter() {
            ensure!(
                !accepted.is_empty(),
                InvalidConfigSnafu {
                    message: format!("no header name given for the field '{}'", field)
                }
            );
        }
        Ok(())
    }
}

pub fn read_config(path: &str) -> PipelineResult<PipelineConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    debug!("read_config: content: {:?}", contents);
    let config: PipelineConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_the_defaults() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.years(), 2013..=2024);
        assert_eq!(config.normalization_rules(), NormalizationRules::default());
    }

    #[test]
    fn partial_config() {
        let js = r#"{
            "firstYear": 2015,
            "columns": { "organization": ["Agency"] },
            "normalization": { "suffixes": [] }
        }"#;
        let config: PipelineConfig = serde_json::from_str(js).unwrap();
        assert_eq!(config.years(), 2015..=2024);
        assert_eq!(config.columns.organization, vec!["Agency".to_string()]);
        assert_eq!(config.columns.name, vec!["name".to_string()]);
        assert!(config.normalization_rules().suffixes.is_empty());
        assert_eq!(config.normalization_rules().prefixes.len(), 5);
    }

    #[test]
    fn inverted_years_are_rejected() {
        let config = PipelineConfig {
            first_year: 2024,
            last_year: 2013,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"outputDirectory": "out", "lastYear": 2020}"#).unwrap();
        let config = read_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.output_directory, "out");
        assert_eq!(config.last_year, 2020);

        let missing = read_config("/nonexistent/config.json");
        assert!(matches!(missing, Err(PipelineError::OpeningJson { .. })));
    }
}
