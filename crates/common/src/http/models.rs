use crate::domain::{Condition, RuleDefinition};
use serde::{Deserialize, Deserializer, Serialize};

/// Paged list envelope used by the rules and devices services.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleModel {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub group_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub severity: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub conditions: Vec<RuleConditionModel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RuleConditionModel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub field: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub operator: String,
    /// The rules service may send numbers or booleans here.
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub value: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl From<RuleModel> for RuleDefinition {
    fn from(model: RuleModel) -> Self {
        RuleDefinition {
            id: model.id,
            name: model.name,
            description: model.description,
            severity: model.severity,
            group_id: model.group_id,
            enabled: model.enabled,
            conditions: model
                .conditions
                .into_iter()
                .map(|c| Condition {
                    field: c.field,
                    operator: c.operator,
                    value: c.value,
                })
                .collect(),
        }
    }
}

/// Device group definition; its conditions are forwarded verbatim as the
/// device-service query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceGroupModel {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub conditions: Vec<DeviceGroupConditionModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceGroupConditionModel {
    pub key: String,
    pub operator: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceModel {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_model_into_definition() {
        let body = json!({
            "Items": [{
                "Id": "rule-1",
                "Name": "Too hot",
                "Enabled": true,
                "Description": "Temperature above limit",
                "GroupId": "group-1",
                "Severity": "critical",
                "Conditions": [{"Field": "temperature", "Operator": "GreaterThan", "Value": "50"}]
            }]
        });

        let list: ItemList<RuleModel> = serde_json::from_value(body).unwrap();
        let rules: Vec<RuleDefinition> = list.items.into_iter().map(Into::into).collect();

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].group_id, "group-1");
        assert!(rules[0].enabled);
        assert_eq!(
            rules[0].conditions,
            vec![Condition {
                field: "temperature".to_string(),
                operator: "GreaterThan".to_string(),
                value: "50".to_string(),
            }]
        );
    }

    #[test]
    fn test_rule_model_missing_optional_fields() {
        let model: RuleModel = serde_json::from_value(json!({"Id": "rule-2"})).unwrap();
        let rule: RuleDefinition = model.into();

        assert!(!rule.enabled);
        assert!(rule.conditions.is_empty());
    }

    #[test]
    fn test_rule_list_tolerates_numeric_values_and_nulls() {
        // Arrange
        let body = json!({
            "Items": [
                {
                    "Id": "rule-numeric",
                    "Name": "Too hot",
                    "Enabled": true,
                    "Description": null,
                    "GroupId": "group-1",
                    "Severity": null,
                    "Conditions": [
                        {"Field": "temperature", "Operator": ">", "Value": 40},
                        {"Field": "running", "Operator": "=", "Value": true}
                    ]
                },
                {
                    "Id": "rule-text",
                    "Name": null,
                    "Enabled": true,
                    "GroupId": "group-2",
                    "Conditions": [{"Field": "mode", "Operator": "=", "Value": "eco"}]
                }
            ]
        });

        // Act
        let list: ItemList<RuleModel> = serde_json::from_value(body).unwrap();
        let rules: Vec<RuleDefinition> = list.items.into_iter().map(Into::into).collect();

        // Assert
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].description, "");
        assert_eq!(rules[0].severity, "");
        assert_eq!(rules[0].conditions[0].value, "40");
        assert_eq!(rules[0].conditions[1].value, "true");
        assert_eq!(rules[1].name, "");
        assert_eq!(rules[1].conditions[0].value, "eco");
    }

    #[test]
    fn test_group_conditions_serialize_back_to_pascal_case() {
        let group: DeviceGroupModel = serde_json::from_value(json!({
            "Id": "group-1",
            "DisplayName": "Chillers",
            "Conditions": [{"Key": "tags.site", "Operator": "EQ", "Value": "north"}]
        }))
        .unwrap();

        let query = serde_json::to_value(&group.conditions).unwrap();

        assert_eq!(
            query,
            json!([{"Key": "tags.site", "Operator": "EQ", "Value": "north"}])
        );
    }
}
