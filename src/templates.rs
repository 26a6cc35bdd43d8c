//! Predefined vendor profiles.
//!
//! This module contains the built-in [`ProfileSpec`]s shipped with the crate,
//! their catalog metadata, and consistency diagnostics.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::{
    FieldFormSpec, HandlerSpec, ListFormSpec, ListSpec, PatternSpec, ProfileDiagnostics,
    ProfileSpec, ReadStepSpec, WriterSpec,
};
use crate::error::ReconcileError;
use crate::extract::{Extractor, Target};
use crate::handler::HandlerRegistry;
use crate::model::Value;

/// Built-in profile names supported by this crate.
pub const BUILTIN_PROFILES: &[&str] = &["ios", "cmts"];

/// Metadata for a built-in profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProfileMetadata {
    pub name: String,
    pub vendor: String,
    pub family: String,
    pub profile_version: String,
    pub entity_types: Vec<String>,
}

fn metadata_for(name: &str) -> Option<ProfileMetadata> {
    let (vendor, family) = match name {
        "ios" => ("Cisco", "IOS/IOS-XE"),
        "cmts" => ("Cisco", "cBR-8 CMTS"),
        _ => return None,
    };
    let spec = spec_for(name)?;
    Some(ProfileMetadata {
        name: name.to_string(),
        vendor: vendor.to_string(),
        family: family.to_string(),
        profile_version: "1.0.0".to_string(),
        entity_types: spec
            .handlers
            .iter()
            .map(|h| h.entity_type.clone())
            .collect(),
    })
}

fn spec_for(key: &str) -> Option<ProfileSpec> {
    match key {
        "ios" => Some(ios()),
        "cmts" => Some(cmts()),
        _ => None,
    }
}

/// Returns names of all built-in profiles.
pub fn available_profiles() -> &'static [&'static str] {
    BUILTIN_PROFILES
}

/// Returns metadata for all built-in profiles.
pub fn profile_catalog() -> Vec<ProfileMetadata> {
    BUILTIN_PROFILES
        .iter()
        .filter_map(|name| metadata_for(name))
        .collect()
}

/// Returns metadata for one profile by name (case-insensitive).
pub fn profile_metadata(name: &str) -> Result<ProfileMetadata, ReconcileError> {
    let key = name.to_ascii_lowercase();
    metadata_for(&key).ok_or_else(|| ReconcileError::ProfileNotFound(name.to_string()))
}

/// Returns the raw spec of a built-in profile (case-insensitive).
pub fn spec_by_name(name: &str) -> Result<ProfileSpec, ReconcileError> {
    spec_for(&name.to_ascii_lowercase())
        .ok_or_else(|| ReconcileError::ProfileNotFound(name.to_string()))
}

/// Compiles a built-in profile by name (case-insensitive).
pub fn by_name(name: &str) -> Result<HandlerRegistry, ReconcileError> {
    spec_by_name(name)?.compile()
}

/// Returns the consistency diagnostics of a built-in profile.
pub fn diagnose_profile(name: &str) -> Result<ProfileDiagnostics, ReconcileError> {
    Ok(spec_by_name(name)?.diagnose())
}

/// Exports diagnostics of one profile as pretty JSON.
pub fn diagnose_profile_json(name: &str) -> Result<String, ReconcileError> {
    let report = diagnose_profile(name)?;
    serde_json::to_string_pretty(&report)
        .map_err(|e| ReconcileError::InternalError(format!("encode diagnostics json: {e}")))
}

/// Exports diagnostics for all built-in profiles as pretty JSON.
pub fn diagnose_all_profiles_json() -> Result<String, ReconcileError> {
    let mut reports = BTreeMap::new();
    for name in BUILTIN_PROFILES {
        reports.insert((*name).to_string(), diagnose_profile(name)?);
    }
    serde_json::to_string_pretty(&reports)
        .map_err(|e| ReconcileError::InternalError(format!("encode diagnostics json: {e}")))
}

fn pattern(trigger: &str, extractor: Extractor, target: Target) -> PatternSpec {
    PatternSpec {
        trigger: trigger.to_string(),
        extractor,
        target,
    }
}

fn field_form(field: &str, positive: &str, negative: Option<&str>) -> FieldFormSpec {
    FieldFormSpec {
        field: field.to_string(),
        positive: positive.to_string(),
        negative: negative.map(str::to_string),
        in_place: true,
        incremental: true,
        default: None,
    }
}

/// `enabled` is stored as the absence of `shutdown`.
fn enabled_form() -> FieldFormSpec {
    FieldFormSpec {
        default: Some(Value::Bool(true)),
        ..field_form(
            "enabled",
            "{% if (value) %}no shutdown{% else %}shutdown{% endif %}",
            Some("no shutdown"),
        )
    }
}

/// Cisco IOS/IOS-XE interfaces.
pub fn ios() -> ProfileSpec {
    let interface = HandlerSpec {
        entity_type: "interface".to_string(),
        read: vec![ReadStepSpec {
            command: "show running-config interface {interface}".to_string(),
            patterns: vec![
                pattern(
                    r"^\s+description (.+)$",
                    Extractor::Text,
                    Target::field("description"),
                ),
                pattern(r"^\s+mtu (\d+)", Extractor::Integer, Target::field("mtu")),
                pattern(
                    r"^\s+shutdown\s*$",
                    Extractor::NegatedFlag,
                    Target::field("enabled"),
                ),
                pattern(
                    r"^\s+ip ospf cost (\d+)",
                    Extractor::Integer,
                    Target::field("ospf_cost"),
                ),
            ],
        }],
        presence: Some(r"^interface \S+".to_string()),
        list: Some(ListSpec {
            command: "show running-config | include ^interface".to_string(),
            trigger: r"^interface (\S+)".to_string(),
        }),
        write: Some(WriterSpec {
            enter: Some("interface {interface}".to_string()),
            exit: Some("exit".to_string()),
            delete: Some("no interface {interface}".to_string()),
            fields: vec![
                field_form("description", "description {value}", Some("no description")),
                FieldFormSpec {
                    default: Some(Value::Int(1500)),
                    ..field_form("mtu", "mtu {value}", Some("no mtu"))
                },
                enabled_form(),
                field_form("ospf_cost", "ip ospf cost {value}", Some("no ip ospf cost")),
            ],
            ..WriterSpec::default()
        }),
    };

    ProfileSpec {
        name: "ios".to_string(),
        handlers: vec![interface],
    }
}

/// Cisco CMTS upstream channels and modulation profiles.
///
/// Modulation profile burst entries are printed as alternating `IUC:` and
/// `Modulation:` lines and are zipped back together by position.
pub fn cmts() -> ProfileSpec {
    let upstream = HandlerSpec {
        entity_type: "upstream".to_string(),
        read: vec![ReadStepSpec {
            command: "show running-config interface upstream {upstream}".to_string(),
            patterns: vec![
                pattern(
                    r"^\s+description (.+)$",
                    Extractor::Text,
                    Target::field("description"),
                ),
                pattern(r"cable-mac (\d+)", Extractor::Text, Target::field("cable_mac")),
                pattern(
                    r"^\s+channel-width (\d+)",
                    Extractor::Integer,
                    Target::field("channel_width"),
                ),
                pattern(
                    r"^\s+shutdown\s*$",
                    Extractor::NegatedFlag,
                    Target::field("enabled"),
                ),
            ],
        }],
        presence: Some(r"^interface [Uu]pstream \S+".to_string()),
        list: Some(ListSpec {
            command: "show running-config | include ^interface upstream".to_string(),
            trigger: r"^interface [Uu]pstream (\S+)".to_string(),
        }),
        // Upstream channels are hardware; there is no delete form.
        write: Some(WriterSpec {
            enter: Some("interface upstream {upstream}".to_string()),
            exit: Some("exit".to_string()),
            fields: vec![
                field_form("description", "description {value}", Some("no description")),
                field_form("cable_mac", "cable-mac {value}", Some("no cable-mac")),
                field_form("channel_width", "channel-width {value}", None),
                enabled_form(),
            ],
            ..WriterSpec::default()
        }),
    };

    let modulation_profile = HandlerSpec {
        entity_type: "modulation-profile".to_string(),
        read: vec![ReadStepSpec {
            command: "show cable modulation-profile {modulation-profile}".to_string(),
            patterns: vec![
                pattern(
                    r"^\s*IUC:\s*(\S+)",
                    Extractor::Text,
                    Target::column("entries", "iuc"),
                ),
                pattern(
                    r"^\s*Modulation:\s*(\S+)",
                    Extractor::Enum {
                        values: [
                            ("qpsk", "qpsk"),
                            ("16qam", "16qam"),
                            ("32qam", "32qam"),
                            ("64qam", "64qam"),
                            ("256qam", "256qam"),
                        ]
                        .iter()
                        .map(|(s, c)| (s.to_string(), c.to_string()))
                        .collect(),
                    },
                    Target::column("entries", "modulation"),
                ),
            ],
        }],
        presence: Some(r"^cable modulation-profile \d+".to_string()),
        list: Some(ListSpec {
            command: "show cable modulation-profile | include ^cable modulation-profile"
                .to_string(),
            trigger: r"^cable modulation-profile (\d+)".to_string(),
        }),
        write: Some(WriterSpec {
            enter: Some("cable modulation-profile {modulation-profile}".to_string()),
            exit: Some("exit".to_string()),
            delete: Some("no cable modulation-profile {modulation-profile}".to_string()),
            lists: vec![ListFormSpec {
                list: "entries".to_string(),
                add: "{% for c in columns.iuc counter=i %}{% for m in columns.modulation counter=i %}{c} {m}\n{% endfor %}{% endfor %}".to_string(),
                remove: Some("{% for it in items %}no {it.iuc}\n{% endfor %}".to_string()),
                incremental: true,
            }],
            ..WriterSpec::default()
        }),
    };

    ProfileSpec {
        name: "cmts".to_string(),
        handlers: vec![upstream, modulation_profile],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_contains_all_builtin_profiles() {
        let catalog = profile_catalog();
        assert_eq!(catalog.len(), BUILTIN_PROFILES.len());
        assert!(catalog.iter().all(|m| !m.entity_types.is_empty()));
    }

    #[test]
    fn metadata_lookup_is_case_insensitive() {
        let meta = profile_metadata("CMTS").expect("cmts metadata");
        assert_eq!(meta.entity_types, vec!["upstream", "modulation-profile"]);
    }

    #[test]
    fn unknown_profile_is_not_found() {
        assert!(matches!(
            by_name("junos"),
            Err(ReconcileError::ProfileNotFound(_))
        ));
        assert!(matches!(
            profile_metadata("junos"),
            Err(ReconcileError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn builtin_profiles_compile() {
        for name in available_profiles() {
            let registry = by_name(name).expect("builtin profile should compile");
            assert!(!registry.is_empty(), "{name}");
        }
    }

    #[test]
    fn builtin_profiles_have_no_diagnostic_issues() {
        for name in available_profiles() {
            let report = diagnose_profile(name).expect("diagnose");
            assert!(!report.has_issues(), "{name}: {report:?}");
        }
    }

    #[test]
    fn diagnostics_export_as_json() {
        let json = diagnose_all_profiles_json().expect("json");
        let decoded: BTreeMap<String, ProfileDiagnostics> =
            serde_json::from_str(&json).expect("decode diagnostics");
        assert_eq!(decoded.len(), BUILTIN_PROFILES.len());
        assert!(diagnose_profile_json("ios").expect("ios").contains("interface"));
    }

    #[test]
    fn builtin_specs_round_trip_through_json() {
        let spec = spec_by_name("cmts").expect("cmts");
        let decoded = ProfileSpec::from_json(&spec.to_json().expect("encode")).expect("decode");
        assert_eq!(decoded, spec);
    }
}
