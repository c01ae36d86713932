use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filter option for the chat selector, as returned by the groups endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOption {
    #[serde(deserialize_with = "id_from_value")]
    pub id: String,
    #[serde(default, alias = "title")]
    pub name: String,
}

fn id_from_value<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "group id must be a string or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group_options() {
        let json = r#"[{"id": -1001, "name": "Signals"}, {"id": "g2", "title": "News"}]"#;
        let groups: Vec<GroupOption> = serde_json::from_str(json).unwrap();
        assert_eq!(groups[0].id, "-1001");
        assert_eq!(groups[1].name, "News");
    }
}
