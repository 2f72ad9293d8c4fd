//! Topic templates.

use crate::{Result, TelemetryError};

/// IoT-platform style device event topic.
pub const DEFAULT_TEMPLATE: &str = "iot-2/evt/{event}/fmt/json";

const PLACEHOLDER: &str = "{event}";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicTemplate {
    template: String,
}

impl Default for TopicTemplate {
    fn default() -> Self {
        TopicTemplate { template: DEFAULT_TEMPLATE.to_string() }
    }
}

impl TopicTemplate {
    /// An empty template falls back to [`DEFAULT_TEMPLATE`].
    pub fn new(template: &str) -> Result<Self> {
        let template = template.trim();
        if template.is_empty() {
            return Ok(Self::default());
        }
        if !template.contains(PLACEHOLDER) {
            return Err(TelemetryError::InvalidTemplate(template.to_string()));
        }
        Ok(TopicTemplate { template: template.to_string() })
    }

    pub fn as_str(&self) -> &str { &self.template }

    /// Concrete topic for one event name.
    pub fn topic(&self, event: &str) -> String {
        self.template.replace(PLACEHOLDER, event)
    }

    /// Subscription filter covering every event topic.
    ///
    /// A level that is exactly `{event}` becomes `+`.  If the placeholder
    /// shares a level with other text, the filter is everything above that
    /// level followed by `#`.
    pub fn wildcard(&self) -> String {
        let levels: Vec<&str> = self.template.split('/').collect();
        let Some(at) = levels.iter().position(|l| l.contains(PLACEHOLDER)) else {
            return self.template.clone();
        };

        if levels[at] == PLACEHOLDER {
            levels
                .iter()
                .map(|l| if *l == PLACEHOLDER { "+" } else { l })
                .collect::<Vec<_>>()
                .join("/")
        } else {
            let mut prefix: Vec<&str> = levels[..at].to_vec();
            prefix.push("#");
            prefix.join("/")
        }
    }
}
