use crate::Result;
use async_trait::async_trait;
use stelshop_core::job::{FieldValues, ProductItem};

/// Catalog columns read by the template generator
pub const POWER_COLUMN: &str = "Potencia";
pub const TANK_CAPACITY_COLUMN: &str = "Capacidad_Tanque_L";
pub const FUEL_CONSUMPTION_COLUMN: &str = "Consumo_Combustible_L_H";

/// SEO description limit used by the shop
const SEO_DESCRIPTION_CHARS: usize = 160;
const RULE: &str = "========================================";

/// Produces shop field values for a product when a job asks for generation
#[async_trait]
pub trait FieldGenerator: Send + Sync {
    async fn generate(&self, item: &ProductItem) -> Result<FieldValues>;
}

/// Deterministic generator built from the product's catalog data
#[derive(Debug, Clone)]
pub struct TemplateFields {
    seo_suffix: String,
}

impl Default for TemplateFields {
    fn default() -> Self {
        Self::new("Industrial Equipment")
    }
}

impl TemplateFields {
    pub fn new(seo_suffix: impl Into<String>) -> Self {
        Self {
            seo_suffix: seo_suffix.into(),
        }
    }

    /// Estimated runtime on a full tank, when both figures are known
    pub fn autonomy_hours(item: &ProductItem) -> Option<f64> {
        let tank = item.attribute_f64(TANK_CAPACITY_COLUMN)?;
        let consumption = item.attribute_f64(FUEL_CONSUMPTION_COLUMN)?;
        (consumption > 0.0).then(|| tank / consumption)
    }

    /// Plain-text block for the shop's short description field
    pub fn short_description(&self, item: &ProductItem) -> String {
        let autonomy = match Self::autonomy_hours(item) {
            Some(hours) => format!("~ {:.1} hours", hours),
            None => "Depends on load".to_string(),
        };
        let power = item.attribute_text(POWER_COLUMN).unwrap_or_default();

        let lines = [
            RULE.to_string(),
            format!("{} {}", item.brand.to_uppercase(), item.model)
                .trim()
                .to_string(),
            RULE.to_string(),
            String::new(),
            "[ GENERAL INFORMATION ]".to_string(),
            format!("- Product: {}", display_name(item)),
            format!("- Family: {}", item.family),
            format!("- Power: {}", power),
            String::new(),
            "[ AUTONOMY ]".to_string(),
            format!("- Estimated autonomy: {}", autonomy),
            String::new(),
            RULE.to_string(),
        ];
        lines.join("\n")
    }

    /// HTML body for the rich-text editor
    pub fn detailed_description(&self, item: &ProductItem) -> String {
        let name = display_name(item);
        let mut paragraphs = vec![format!(
            "The {} is a reliable and efficient answer to your power needs.{}",
            name,
            match (item.brand.is_empty(), item.model.is_empty()) {
                (false, false) => format!(" Built by {} as model {}.", item.brand, item.model),
                (false, true) => format!(" Built by {}.", item.brand),
                _ => String::new(),
            }
        )];
        if let Some(power) = item.attribute_text(POWER_COLUMN) {
            paragraphs.push(format!(
                "With {} of output it keeps industrial, commercial and residential operations running.",
                power
            ));
        }
        if let Some(hours) = Self::autonomy_hours(item) {
            paragraphs.push(format!(
                "A full tank gives an estimated {:.1} hours of continuous operation.",
                hours
            ));
        }

        let body: String = paragraphs
            .iter()
            .map(|p| format!("<p>{}</p>", escape_html(p)))
            .collect();
        format!(
            "<div><h2>{}</h2>{}</div>",
            escape_html(&name.to_uppercase()),
            body
        )
    }

    pub fn seo_title(&self, item: &ProductItem) -> String {
        format!("{} - {}", display_name(item), self.seo_suffix)
    }

    pub fn build(&self, item: &ProductItem) -> FieldValues {
        let description = self.short_description(item);
        FieldValues {
            seo_description: Some(description.chars().take(SEO_DESCRIPTION_CHARS).collect()),
            seo_title: Some(self.seo_title(item)),
            detailed_description: Some(self.detailed_description(item)),
            description: Some(description),
            featured: None,
        }
    }
}

#[async_trait]
impl FieldGenerator for TemplateFields {
    async fn generate(&self, item: &ProductItem) -> Result<FieldValues> {
        Ok(self.build(item))
    }
}

fn display_name(item: &ProductItem) -> String {
    if item.name.trim().is_empty() {
        item.sku.clone()
    } else {
        item.name.clone()
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
