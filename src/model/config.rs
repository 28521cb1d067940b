// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Arbor-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Arbor and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use serde::Deserialize;

use super::value::Nullability;

/// JDBC `java.sql.Types.INTEGER`.
pub const SQL_TYPE_INTEGER: i64 = 4;

/// Defaults applied by the typed node constructors, plus behaviour switches for compound
/// mutators. Every session carries its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct GraphConfig {
    pub default_table_name: String,
    pub default_column_name: String,
    pub default_column_type: i64,
    pub default_precision: i64,
    pub default_scale: i64,
    pub default_nullable: bool,
    pub default_auto_increment: bool,
    pub default_remarks: String,
    pub default_value: Option<String>,
    /// When set, changing a column's type also clears its source data type name.
    pub magic_enabled: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            default_table_name: "New_Table".to_owned(),
            default_column_name: "New_Column".to_owned(),
            default_column_type: SQL_TYPE_INTEGER,
            default_precision: 10,
            default_scale: 0,
            default_nullable: false,
            default_auto_increment: false,
            default_remarks: String::new(),
            default_value: None,
            magic_enabled: true,
        }
    }
}

impl GraphConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn default_nullability(&self) -> Nullability {
        if self.default_nullable {
            Nullability::Nullable
        } else {
            Nullability::NoNulls
        }
    }
}

#[cfg(test)]
mod tests {
    use super::GraphConfig;

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config =
            GraphConfig::from_json_str(r#"{"default_precision": 12, "magic_enabled": false}"#)
                .expect("config");
        assert_eq!(config.default_precision, 12);
        assert!(!config.magic_enabled);
        assert_eq!(config.default_column_name, "New_Column");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = GraphConfig::from_json_str(r#"{"colour": "blue"}"#).expect("config");
        assert_eq!(config, GraphConfig::default());
    }
}
