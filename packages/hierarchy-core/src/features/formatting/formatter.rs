//! Value formatting port and the default formatter

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};

use crate::errors::Result;
use crate::shared::models::{ConcatenatedValuePart, NodeLabel, PrimitiveValue};

/// Converts typed values into display strings
#[async_trait]
pub trait ValueFormatter: Send + Sync {
    async fn format(&self, value: &PrimitiveValue) -> Result<String>;
}

/// Locale-neutral formatter used when the caller doesn't supply one
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValueFormatter;

fn format_double(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{}", value as i64);
    }
    let text = format!("{:.6}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

fn format_date_time(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%Y-%m-%d %H:%M:%S").to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format("%Y-%m-%d %H:%M:%S").to_string();
    }
    raw.to_string()
}

impl DefaultValueFormatter {
    pub fn format_sync(value: &PrimitiveValue) -> String {
        match value {
            PrimitiveValue::Boolean(b) => b.to_string(),
            PrimitiveValue::Integer(i) => i.to_string(),
            PrimitiveValue::Double(d) => format_double(*d),
            PrimitiveValue::String(s) | PrimitiveValue::Id(s) => s.clone(),
            PrimitiveValue::DateTime(raw) => format_date_time(raw),
            PrimitiveValue::Point2d { x, y } => {
                format!("({}, {})", format_double(*x), format_double(*y))
            }
            PrimitiveValue::Point3d { x, y, z } => format!(
                "({}, {}, {})",
                format_double(*x),
                format_double(*y),
                format_double(*z)
            ),
            PrimitiveValue::Navigation { label, .. } => label.clone(),
        }
    }
}

#[async_trait]
impl ValueFormatter for DefaultValueFormatter {
    async fn format(&self, value: &PrimitiveValue) -> Result<String> {
        Ok(Self::format_sync(value))
    }
}

/// Format a raw label; concatenated parts are joined without separators
pub async fn format_label(formatter: &dyn ValueFormatter, label: &NodeLabel) -> Result<String> {
    match label {
        NodeLabel::Text(text) => Ok(text.clone()),
        NodeLabel::Concatenated(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    ConcatenatedValuePart::Text(text) => out.push_str(text),
                    ConcatenatedValuePart::Property { value, .. }
                    | ConcatenatedValuePart::Primitive(value) => {
                        out.push_str(&formatter.format(value).await?)
                    }
                }
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_formatting() {
        assert_eq!(format_double(4.0), "4");
        assert_eq!(format_double(1.25), "1.25");
        assert_eq!(format_double(0.1 + 0.2), "0.3");
        assert_eq!(format_double(-0.0000001), "0");
    }

    #[test]
    fn test_date_time_formatting() {
        assert_eq!(format_date_time("2024-03-01T10:20:30Z"), "2024-03-01 10:20:30");
        assert_eq!(format_date_time("2024-03-01T10:20:30.5"), "2024-03-01 10:20:30");
        assert_eq!(format_date_time("yesterday"), "yesterday");
    }

    #[tokio::test]
    async fn test_concatenated_label() {
        let label = NodeLabel::Concatenated(vec![
            ConcatenatedValuePart::Text("Door ".into()),
            ConcatenatedValuePart::Property {
                class_name: "Bis.Door".into(),
                property_name: "Width".into(),
                value: PrimitiveValue::Double(1.5),
            },
            ConcatenatedValuePart::Text(" @ ".into()),
            ConcatenatedValuePart::Primitive(PrimitiveValue::Point2d { x: 1.0, y: 2.0 }),
        ]);
        let text = format_label(&DefaultValueFormatter, &label).await.unwrap();
        assert_eq!(text, "Door 1.5 @ (1, 2)");
    }
}
