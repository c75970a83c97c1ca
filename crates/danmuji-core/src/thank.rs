//! Gift thank-you template.

use serde::{Deserialize, Serialize};
use tinytemplate::{TinyTemplate, format_unescaped};

use crate::types::GiftMessage;

pub const DEFAULT_TEMPLATE: &str = "感谢{uname}投喂的{gift_num}个{gift_name}~";

const TEMPLATE_NAME: &str = "gift";

/// Thank-you line rendered for each displayed gift while `open` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftThankConfig {
    pub template: String,
    pub open: bool,
}

impl Default for GiftThankConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
            open: true,
        }
    }
}

impl GiftThankConfig {
    /// Fill the template from the gift's fields (`{uname}`, `{gift_num}`,
    /// `{gift_name}`, `{uid}`). `None` while closed, or when the template
    /// does not parse or names a field the gift lacks.
    pub fn render(&self, gift: &GiftMessage) -> Option<String> {
        if !self.open {
            return None;
        }

        let mut tt = TinyTemplate::new();
        tt.set_default_formatter(&format_unescaped);
        if let Err(e) = tt.add_template(TEMPLATE_NAME, &self.template) {
            tracing::error!(error = %e, template = %self.template, "invalid gift thank template");
            return None;
        }
        match tt.render(TEMPLATE_NAME, gift) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(error = %e, "gift thank template failed to render");
                None
            }
        }
    }
}
