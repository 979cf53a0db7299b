//! Age threshold filters.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value, json};
use warden_core::Resource;
use warden_schema::TypeSchema;
use warden_schema::definitions::COMPARISON_OPERATORS_REF;

use super::ops::Operator;
use super::{Filter, FilterContext};
use crate::error::{ConfigurationError, DataError, EngineError};

const DEFAULT_DAYS: f64 = 60.0;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Compares the age of a timestamp field against a threshold.
///
/// With the default operator (`ge`) a resource matches when it is at least
/// `days` old. Resources whose timestamp is missing or unparseable never match.
#[derive(Debug, Clone)]
pub struct AgeFilter {
    kind: String,
    date_attribute: String,
    op: Operator,
    threshold_secs: f64,
}

impl AgeFilter {
    /// Full option set: `op`, `days`, `hours`, `minutes`.
    pub fn schema(type_name: &str) -> TypeSchema {
        Self::days_schema(type_name)
            .property("hours", json!({"type": "number", "minimum": 0}))
            .property("minutes", json!({"type": "number", "minimum": 0}))
    }

    /// Option set restricted to `op` and `days`.
    pub fn days_schema(type_name: &str) -> TypeSchema {
        TypeSchema::new(type_name)
            .property("op", json!({"$ref": COMPARISON_OPERATORS_REF}))
            .property("days", json!({"type": "number", "minimum": 0}))
    }

    pub fn from_config(
        kind: &str,
        date_attribute: &str,
        config: &Map<String, Value>,
    ) -> Result<Self, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidFilterConfiguration {
            filter: kind.to_string(),
            reason,
        };

        let op = match config.get("op").and_then(Value::as_str) {
            Some(name) => {
                Operator::parse(name).ok_or_else(|| invalid(format!("unknown operator '{name}'")))?
            }
            None => Operator::Ge,
        };
        if !op.is_ordering() {
            return Err(invalid(format!("operator '{op}' cannot compare ages")));
        }

        let days = config.get("days").and_then(Value::as_f64);
        let hours = config.get("hours").and_then(Value::as_f64);
        let minutes = config.get("minutes").and_then(Value::as_f64);

        let days = match (days, hours, minutes) {
            (None, None, None) => DEFAULT_DAYS,
            (days, _, _) => days.unwrap_or(0.0),
        };
        let threshold_secs =
            days * 86_400.0 + hours.unwrap_or(0.0) * 3_600.0 + minutes.unwrap_or(0.0) * 60.0;

        Ok(Self {
            kind: kind.to_string(),
            date_attribute: date_attribute.to_string(),
            op,
            threshold_secs,
        })
    }

    /// Threshold in seconds.
    pub fn threshold_secs(&self) -> f64 {
        self.threshold_secs
    }

    /// Age of `resource` in seconds relative to `now`.
    pub fn age_secs(
        &self,
        resource: &Resource,
        resource_id: &str,
        now: DateTime<Utc>,
    ) -> Result<f64, DataError> {
        let invalid = |reason: String| DataError::InvalidAgeValue {
            resource_id: resource_id.to_string(),
            field: self.date_attribute.clone(),
            reason,
        };

        let raw = resource
            .get_path(&self.date_attribute)
            .filter(|v| !v.is_null())
            .ok_or_else(|| invalid("field is absent".to_string()))?;
        let timestamp = parse_timestamp(raw).map_err(invalid)?;

        Ok((now - timestamp).num_milliseconds() as f64 / 1_000.0)
    }

    pub fn matches(&self, resource: &Resource, resource_id: &str, now: DateTime<Utc>) -> Result<bool, DataError> {
        let age = self.age_secs(resource, resource_id, now)?;
        Ok(self.op.compare_numbers(age, self.threshold_secs))
    }
}

/// Parse an RFC 3339 string, a naive UTC string or epoch seconds/milliseconds.
pub fn parse_timestamp(raw: &Value) -> Result<DateTime<Utc>, String> {
    match raw {
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Ok(parsed.with_timezone(&Utc));
            }
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|naive| naive.and_utc())
                .ok_or_else(|| format!("unrecognized timestamp '{text}'"))
        }
        Value::Number(n) => {
            let epoch = n.as_i64().ok_or_else(|| format!("unrecognized epoch '{n}'"))?;
            let parsed = if epoch.abs() >= 100_000_000_000 {
                Utc.timestamp_millis_opt(epoch)
            } else {
                Utc.timestamp_opt(epoch, 0)
            };
            parsed
                .single()
                .ok_or_else(|| format!("epoch '{epoch}' out of range"))
        }
        other => Err(format!("expected a timestamp, found {other}")),
    }
}

#[async_trait]
impl Filter for AgeFilter {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn process(
        &self,
        resources: Vec<Resource>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<Resource>, EngineError> {
        let id_field = ctx.resource_type.id_field;
        let mut matched = Vec::with_capacity(resources.len());

        for resource in resources {
            let resource_id = resource.id(id_field).unwrap_or_default();
            match self.matches(&resource, &resource_id, ctx.now) {
                Ok(true) => matched.push(resource),
                Ok(false) => {}
                Err(e) => {
                    tracing::debug!(filter = %self.kind, resource_id = %resource_id, error = %e, "Excluding resource");
                }
            }
        }

        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn filter(config: Value) -> AgeFilter {
        AgeFilter::from_config("image-age", "created_at", config.as_object().unwrap()).unwrap()
    }

    fn image(created_at: Value) -> Resource {
        Resource::from_value(json!({"id": "img", "created_at": created_at})).unwrap()
    }

    #[test]
    fn test_default_threshold_is_sixty_days() {
        let f = filter(json!({}));
        assert_eq!(f.threshold_secs(), 60.0 * 86_400.0);
    }

    #[test]
    fn test_days_hours_minutes_combine() {
        let f = filter(json!({"days": 1, "hours": 2, "minutes": 30}));
        assert_eq!(f.threshold_secs(), 86_400.0 + 7_200.0 + 1_800.0);

        let hours_only = filter(json!({"hours": 6}));
        assert_eq!(hours_only.threshold_secs(), 21_600.0);
    }

    #[test]
    fn test_zero_days_matches_past_timestamps() {
        let now = Utc::now();
        let f = filter(json!({"days": 0}));
        let past = image(json!((now - Duration::seconds(5)).to_rfc3339()));
        assert!(f.matches(&past, "img", now).unwrap());
        let exact = image(json!(now.to_rfc3339()));
        assert!(f.matches(&exact, "img", now).unwrap());
    }

    #[test]
    fn test_huge_threshold_matches_nothing() {
        let now = Utc::now();
        let f = filter(json!({"days": 100000}));
        let old = image(json!("2018-07-03T08:13:43Z"));
        assert!(!f.matches(&old, "img", now).unwrap());
    }

    #[test]
    fn test_operator_lt_selects_young_resources() {
        let now = Utc::now();
        let f = filter(json!({"days": 7, "op": "lt"}));
        let young = image(json!((now - Duration::days(1)).to_rfc3339()));
        let old = image(json!((now - Duration::days(30)).to_rfc3339()));
        assert!(f.matches(&young, "img", now).unwrap());
        assert!(!f.matches(&old, "img", now).unwrap());
    }

    #[test]
    fn test_non_ordering_operator_rejected() {
        let config = json!({"op": "contains"});
        let err = AgeFilter::from_config("image-age", "created_at", config.as_object().unwrap())
            .unwrap_err();
        assert!(err.to_string().contains("cannot compare ages"));
    }

    #[test]
    fn test_timestamp_formats() {
        assert!(parse_timestamp(&json!("2024-01-02T03:04:05Z")).is_ok());
        assert!(parse_timestamp(&json!("2024-01-02T03:04:05.123+08:00")).is_ok());
        assert!(parse_timestamp(&json!("2024-01-02T03:04:05")).is_ok());
        assert!(parse_timestamp(&json!("2024-01-02 03:04:05")).is_ok());
        assert_eq!(
            parse_timestamp(&json!(1_700_000_000)).unwrap(),
            parse_timestamp(&json!(1_700_000_000_000i64)).unwrap()
        );
        assert!(parse_timestamp(&json!("yesterday")).is_err());
        assert!(parse_timestamp(&json!(true)).is_err());
    }

    #[test]
    fn test_missing_timestamp_is_a_data_error() {
        let f = filter(json!({"days": 1}));
        let resource = Resource::from_value(json!({"id": "img"})).unwrap();
        let err = f.matches(&resource, "img", Utc::now()).unwrap_err();
        assert!(matches!(err, DataError::InvalidAgeValue { .. }));
    }
}
