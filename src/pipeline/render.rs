//! Signature document rendering

use crate::config::DocumentConfig;
use crate::error::ValidationError;
use crate::models::{SignupRecord, VerifiedProfile};

const PROFILE_BASE_URL: &str = "https://twitter.com";

/// Everything the publisher needs to write for one signatory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSignature {
    pub path: String,
    pub document: String,
    pub commit_title: String,
    pub review_body: String,
}

/// Renders front-matter documents and pull-request bodies
#[derive(Debug, Clone, Default)]
pub struct DocumentRenderer {
    config: DocumentConfig,
}

impl DocumentRenderer {
    pub fn new(config: DocumentConfig) -> Self {
        Self { config }
    }

    pub fn render(
        &self,
        record: &SignupRecord,
        profile: &VerifiedProfile,
    ) -> Result<RenderedSignature, ValidationError> {
        record.require_name()?;
        if !record.link_profile && record.link.chars().any(char::is_control) {
            return Err(ValidationError::InvalidLink(record.link.clone()));
        }

        let document = Self::render_document(record, &profile.handle);
        let review_body = Self::render_review_body(record, profile, &document);

        Ok(RenderedSignature {
            path: self.document_path(&record.user_id),
            commit_title: format!("SignBot: Add signatory '{}' ({})", record.name, profile.handle),
            document,
            review_body,
        })
    }

    /// `<collection>/<userId>.<extension>`
    pub fn document_path(&self, user_id: &str) -> String {
        format!("{}/{}.{}", self.config.collection, user_id, self.config.extension)
    }

    fn render_document(record: &SignupRecord, handle: &str) -> String {
        let mut doc = String::from("---\n");
        doc.push_str(&format!("  name: {}\n", quoted(&record.name)));

        if record.link_profile {
            doc.push_str(&format!("  link: {}/{}\n", PROFILE_BASE_URL, handle));
        } else if !record.link.is_empty() {
            doc.push_str(&format!("  link: {}\n", record.link));
        }
        if !record.affiliation.is_empty() {
            doc.push_str(&format!("  affiliation: {}\n", quoted(&record.affiliation)));
        }
        if !record.title.is_empty() {
            doc.push_str(&format!("  occupation_title: {}\n", quoted(&record.title)));
        }

        doc.push_str("---");
        doc
    }

    fn render_review_body(record: &SignupRecord, profile: &VerifiedProfile, document: &str) -> String {
        let mut body = String::new();
        body.push_str(&format!("Twitter user: {}/{}\n", PROFILE_BASE_URL, profile.handle));
        body.push_str(&format!(
            "Created: {}, Followers: {}, Following: {}, Tweets: {}, Egg: {}\n",
            profile.created_at.format("%Y-%m-%d %H:%M:%S %z"),
            profile.followers,
            profile.following,
            profile.posts,
            profile.default_avatar
        ));
        body.push('\n');
        body.push_str("Twitter profile fields:\n");
        body.push_str(&format!("Name: {}\n", profile.display_name));
        body.push_str(&format!("Website: {}\n", profile.url));
        body.push_str(&format!("Tagline: {}\n", profile.bio));
        body.push('\n');
        body.push_str(&format!("Personal page: {}\n", record.personal_page));
        body.push('\n');
        body.push_str("Signature file contents:\n");
        body.push_str("    ");
        body.push_str(&document.replace('\n', "\n    "));
        body
    }
}

/// Double-quoted YAML scalar; line breaks never reach the output raw
fn quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
