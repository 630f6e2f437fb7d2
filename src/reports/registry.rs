//! Report definition registry — the fixed set of reports a site must submit.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ReportError;

use super::model::ReportKey;

/// Identity of the site being onboarded, fed to report generators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteInfo {
    pub name: String,
    pub description: String,
    pub url: String,
}

/// Inputs available to every report generator.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub site: SiteInfo,
    /// Version of this service, reported as the producer.
    pub producer_version: String,
}

impl GenerationContext {
    pub fn new(site: SiteInfo) -> Self {
        Self {
            site,
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A required report. The set is closed; new reports are new variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportDefinition {
    WebsiteProfile,
    WebsiteContentAreas,
}

impl ReportDefinition {
    pub fn report_type(&self) -> &'static str {
        match self {
            Self::WebsiteProfile => "website_profile",
            Self::WebsiteContentAreas => "website_content_areas",
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            Self::WebsiteProfile | Self::WebsiteContentAreas => 1,
        }
    }

    pub fn key(&self) -> ReportKey {
        ReportKey::new(self.report_type(), self.version())
    }

    /// Produce the report payload.
    pub fn generate(&self, ctx: &GenerationContext) -> Result<serde_json::Value, ReportError> {
        match self {
            Self::WebsiteProfile => {
                if ctx.site.url.trim().is_empty() {
                    return Err(ReportError::MissingSiteField("url"));
                }
                Ok(json!({
                    "site": {
                        "name": ctx.site.name,
                        "description": ctx.site.description,
                        "url": ctx.site.url,
                    },
                    "environment": {
                        "producer_version": ctx.producer_version,
                        "os": std::env::consts::OS,
                        "arch": std::env::consts::ARCH,
                    },
                }))
            }
            Self::WebsiteContentAreas => Ok(json!({ "areas": [] })),
        }
    }
}

/// Ordered list of required report definitions plus their generation context.
#[derive(Debug, Clone)]
pub struct ReportRegistry {
    definitions: Vec<ReportDefinition>,
    context: GenerationContext,
}

impl ReportRegistry {
    /// The default registry: every report a site must submit, in run order.
    pub fn new(context: GenerationContext) -> Self {
        Self::with_definitions(
            vec![
                ReportDefinition::WebsiteProfile,
                ReportDefinition::WebsiteContentAreas,
            ],
            context,
        )
    }

    pub fn with_definitions(definitions: Vec<ReportDefinition>, context: GenerationContext) -> Self {
        Self {
            definitions,
            context,
        }
    }

    pub fn required(&self) -> &[ReportDefinition] {
        &self.definitions
    }

    pub fn required_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for def in &self.definitions {
            let t = def.report_type().to_string();
            if !types.contains(&t) {
                types.push(t);
            }
        }
        types
    }

    pub fn find(&self, key: &ReportKey) -> Option<ReportDefinition> {
        self.definitions
            .iter()
            .copied()
            .find(|d| d.report_type() == key.report_type && d.version() == key.version)
    }

    pub fn context(&self) -> &GenerationContext {
        &self.context
    }
}
