//! Namespace quota reduction

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

const CPU_KEY: &str = "limits.cpu";
const GPU_KEY: &str = "limits.nvidia.com/gpu";
const MEMORY_KEY: &str = "limits.memory";

/// Used versus hard limit for one resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuotaMeter {
    pub used: u64,
    pub max: u64,
}

impl QuotaMeter {
    /// Whole-number percentage of the limit in use, capped at 100.
    /// A zero limit reads as 0%.
    pub fn ratio(&self) -> u64 {
        if self.max == 0 {
            return 0;
        }
        let pct = (self.used as f64 / self.max as f64 * 100.0).round() as u64;
        pct.min(100)
    }
}

/// Quota of one namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Quota {
    pub cpu: QuotaMeter,
    pub gpu: QuotaMeter,
    /// Unit suffix stripped
    pub memory: QuotaMeter,
}

impl Quota {
    /// Reduce the backend quota listing. Only the first entry counts; an
    /// empty or malformed listing means the namespace has no quota.
    pub fn from_response(value: &Value) -> Option<Quota> {
        let first = value.as_array()?.first()?;
        let status = first.get("status");
        let used = status.and_then(|s| s.get("used"));
        let hard = status.and_then(|s| s.get("hard"));
        let field = |side: Option<&Value>, key: &str| side.and_then(|s| s.get(key)).cloned();

        Some(Quota {
            cpu: QuotaMeter {
                used: leading_integer(field(used, CPU_KEY).as_ref()),
                max: leading_integer(field(hard, CPU_KEY).as_ref()),
            },
            gpu: QuotaMeter {
                used: leading_integer(field(used, GPU_KEY).as_ref()),
                max: leading_integer(field(hard, GPU_KEY).as_ref()),
            },
            memory: QuotaMeter {
                used: digits_only(field(used, MEMORY_KEY).as_ref()),
                max: digits_only(field(hard, MEMORY_KEY).as_ref()),
            },
        })
    }
}

fn number_floor(n: &serde_json::Number) -> u64 {
    n.as_u64()
        .unwrap_or_else(|| n.as_f64().unwrap_or(0.0).max(0.0) as u64)
}

/// Integer prefix of a quantity (`"2"` -> 2, `"500m"` -> 500); non-numeric
/// input reads as 0
pub fn leading_integer(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => number_floor(n),
        Some(Value::String(s)) => {
            let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        }
        _ => 0,
    }
}

/// Quantity with every non-digit character removed (`"8Gi"` -> 8)
pub fn digits_only(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(n)) => number_floor(n),
        Some(Value::String(s)) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        }
        _ => 0,
    }
}

/// Hard limits to set on a namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaLimits {
    pub cpu: Option<String>,
    pub gpu: Option<String>,
    pub memory: Option<String>,
}

impl QuotaLimits {
    /// Backend quota map; unset limits are omitted
    pub fn to_map(&self) -> BTreeMap<String, String> {
        [(CPU_KEY, &self.cpu), (GPU_KEY, &self.gpu), (MEMORY_KEY, &self.memory)]
            .into_iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| (key.to_string(), v.clone())))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.gpu.is_none() && self.memory.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quota_from_response() {
        let quota = Quota::from_response(&json!([{
            "status": {
                "used": {"limits.cpu": "3", "limits.memory": "8Gi", "limits.nvidia.com/gpu": "1"},
                "hard": {"limits.cpu": "8", "limits.memory": "32Gi", "limits.nvidia.com/gpu": "0"}
            }
        }]))
        .unwrap();

        assert_eq!(quota.memory, QuotaMeter { used: 8, max: 32 });
        assert_eq!(quota.memory.ratio(), 25);
        assert_eq!(quota.cpu.ratio(), 38);
        assert_eq!(quota.gpu.ratio(), 0);
    }

    #[test]
    fn test_no_quota() {
        assert!(Quota::from_response(&json!([])).is_none());
        assert!(Quota::from_response(&json!({"error": "x"})).is_none());
        let empty = Quota::from_response(&json!([{}])).unwrap();
        assert_eq!(empty, Quota::default());
    }

    #[test]
    fn test_quantity_parsing() {
        assert_eq!(digits_only(Some(&json!("8Gi"))), 8);
        assert_eq!(digits_only(Some(&json!("512Mi"))), 512);
        assert_eq!(digits_only(Some(&json!("Gi"))), 0);
        assert_eq!(leading_integer(Some(&json!("500m"))), 500);
        assert_eq!(leading_integer(Some(&json!(4))), 4);
        assert_eq!(leading_integer(None), 0);
    }

    #[test]
    fn test_ratio_caps_at_100() {
        let meter = QuotaMeter { used: 12, max: 8 };
        assert_eq!(meter.ratio(), 100);
    }

    #[test]
    fn test_limits_map() {
        let limits = QuotaLimits {
            cpu: Some("8".into()),
            gpu: None,
            memory: Some("32Gi".into()),
        };
        let map = limits.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["limits.memory"], "32Gi");
        assert!(!limits.is_empty());
    }
}
