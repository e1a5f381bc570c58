use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;

/// A thing property in the shape the cloud API serves it.
#[derive(Debug, Clone, Serialize)]
pub struct Property {
    pub created_at: String,
    pub updated_at: String,
    pub value_updated_at: String,
    pub last_value: Value,
    pub href: String,
    pub id: String,
    pub linked_to_trigger: bool,
    pub name: String,
    pub permission: String,
    pub persist: bool,
    pub tag: i64,
    pub thing_id: String,
    pub thing_name: String,
    #[serde(rename = "type")]
    pub value_type: String,
    pub update_parameter: f64,
    pub update_strategy: String,
    pub variable_name: String,
}

/// Static description of one simulated property.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub id: String,
    pub name: &'static str,
    pub value_type: &'static str,
    pub tag: i64,
}

pub fn default_specs(count: usize) -> Vec<PropertySpec> {
    const KINDS: [(&str, &str); 3] = [
        ("temperature", "TEMPERATURE_C"),
        ("humidity", "HUMIDITY"),
        ("door_open", "STATUS"),
    ];

    (0..count)
        .map(|i| {
            let (name, value_type) = KINDS[i % KINDS.len()];
            PropertySpec {
                id: uuid::Uuid::new_v4().to_string(),
                name,
                value_type,
                tag: i as i64 + 1,
            }
        })
        .collect()
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Produces a snapshot; `malformed` swaps the value for a non-numeric string.
pub fn generate_property(
    rng: &mut impl Rng,
    spec: &PropertySpec,
    thing_id: &str,
    thing_name: &str,
    created_at: DateTime<Utc>,
    malformed: bool,
) -> Property {
    let now = Utc::now();

    let last_value = if malformed {
        Value::from("sensor-fault")
    } else {
        match spec.value_type {
            "TEMPERATURE_C" => Value::from(rng.gen_range(-25.0..8.0_f64)), // Cold room range
            "HUMIDITY" => Value::from(rng.gen_range(30.0..95.0_f64)),
            _ => Value::from(rng.gen_bool(0.1)),
        }
    };

    Property {
        created_at: timestamp(created_at),
        updated_at: timestamp(now),
        value_updated_at: timestamp(now),
        last_value,
        href: format!("/iot/v1/things/{}/properties/{}", thing_id, spec.id),
        id: spec.id.clone(),
        linked_to_trigger: false,
        name: spec.name.to_string(),
        permission: "READ_ONLY".to_string(),
        persist: true,
        tag: spec.tag,
        thing_id: thing_id.to_string(),
        thing_name: thing_name.to_string(),
        value_type: spec.value_type.to_string(),
        update_parameter: 0.0,
        update_strategy: "ON_CHANGE".to_string(),
        variable_name: spec.name.to_string(),
    }
}
