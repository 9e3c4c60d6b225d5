use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single catalog product queued for update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductItem {
    pub sku: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub family: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
    /// Values to write into the shop record
    #[serde(default)]
    pub fields: FieldValues,
    /// Extra catalog columns (power, fuel consumption, tank capacity, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl ProductItem {
    pub fn new(sku: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            name: String::new(),
            brand: String::new(),
            model: String::new(),
            family: String::new(),
            price: None,
            stock: None,
            fields: FieldValues::default(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_fields(mut self, fields: FieldValues) -> Self {
        self.fields = fields;
        self
    }

    /// Look up an attribute as a number, accepting numeric strings
    pub fn attribute_f64(&self, key: &str) -> Option<f64> {
        match self.attributes.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().replace(',', ".").parse().ok(),
            _ => None,
        }
    }

    /// Look up an attribute rendered as display text
    pub fn attribute_text(&self, key: &str) -> Option<String> {
        match self.attributes.get(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Shop fields written by the navigator. `None` means "leave untouched".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// HTML body for the rich-text editor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seo_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
}

impl FieldValues {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.detailed_description.is_none()
            && self.seo_title.is_none()
            && self.seo_description.is_none()
            && self.featured.is_none()
    }

    pub fn has_seo(&self) -> bool {
        self.seo_title.is_some() || self.seo_description.is_some()
    }

    /// Overlay `other` on top of `self`; values present in `other` win
    pub fn merged_with(&self, other: &FieldValues) -> FieldValues {
        FieldValues {
            description: other.description.clone().or_else(|| self.description.clone()),
            detailed_description: other
                .detailed_description
                .clone()
                .or_else(|| self.detailed_description.clone()),
            seo_title: other.seo_title.clone().or_else(|| self.seo_title.clone()),
            seo_description: other
                .seo_description
                .clone()
                .or_else(|| self.seo_description.clone()),
            featured: other.featured.or(self.featured),
        }
    }

    pub fn without_seo(mut self) -> FieldValues {
        self.seo_title = None;
        self.seo_description = None;
        self
    }
}

/// Flags supplied with a processing request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSettings {
    /// Generate field values for every item before writing them
    #[serde(default)]
    pub use_ai: bool,
    /// Write SEO title/description
    #[serde(default = "default_true")]
    pub update_seo: bool,
}

fn default_true() -> bool {
    true
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            use_ai: false,
            update_seo: true,
        }
    }
}

/// An ordered batch of products plus settings, processed in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub items: Vec<ProductItem>,
    #[serde(default)]
    pub settings: JobSettings,
}

impl ProcessingJob {
    pub fn new(items: Vec<ProductItem>, settings: JobSettings) -> Self {
        Self { items, settings }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_fields_prefer_overlay() {
        let base = FieldValues {
            description: Some("base".to_string()),
            seo_title: Some("base title".to_string()),
            ..Default::default()
        };
        let overlay = FieldValues {
            description: Some("generated".to_string()),
            featured: Some(true),
            ..Default::default()
        };

        let merged = base.merged_with(&overlay);

        assert_eq!(merged.description.as_deref(), Some("generated"));
        assert_eq!(merged.seo_title.as_deref(), Some("base title"));
        assert_eq!(merged.featured, Some(true));
    }

    #[test]
    fn test_without_seo_drops_seo_fields() {
        let fields = FieldValues {
            description: Some("text".to_string()),
            seo_title: Some("title".to_string()),
            seo_description: Some("meta".to_string()),
            ..Default::default()
        };

        let fields = fields.without_seo();
        assert!(!fields.has_seo());
        assert!(fields.description.is_some());
    }

    #[test]
    fn test_attribute_f64_accepts_decimal_comma() {
        let mut item = ProductItem::new("GEN-1");
        item.attributes
            .insert("Capacidad_Tanque_L".to_string(), serde_json::json!("25,5"));
        item.attributes
            .insert("Consumo_Combustible_L_H".to_string(), serde_json::json!(1.5));

        assert_eq!(item.attribute_f64("Capacidad_Tanque_L"), Some(25.5));
        assert_eq!(item.attribute_f64("Consumo_Combustible_L_H"), Some(1.5));
        assert_eq!(item.attribute_f64("missing"), None);
    }

    #[test]
    fn test_settings_default_updates_seo() {
        let job: ProcessingJob =
            serde_json::from_str(r#"{"items": [{"sku": "A"}]}"#).unwrap();
        assert!(job.settings.update_seo);
        assert!(!job.settings.use_ai);
    }
}
