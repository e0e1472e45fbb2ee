//! Message builder

use std::collections::HashMap;

use reqwest::Url;

use super::{
    errors::MessageError,
    templates::{
        initialize_base_tokens, initialize_date_time_tokens, replace_tokens, TemplateCatalog,
        TemplateLoader,
    },
    EmailAddress, Message, MessageUser, DEFAULT_HTML_CONTENT_TYPE, DEFAULT_TEXT_CONTENT_TYPE,
};

#[derive(Debug, Clone)]
enum TemplateSource {
    Files {
        loader: TemplateLoader,
        name: String,
        language: Option<String>,
    },
    Catalog {
        text: String,
        html: String,
    },
}

/// Builds a [`Message`] from literal bodies or a template.
///
/// Addresses are validated and tokens substituted when [`build`](Self::build)
/// is called.
///
/// ```
/// use mail_dispatch::domain::messaging::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("noreply@example.com")
///     .to_list("a@example.com; b@example.com")
///     .subject("Hello")
///     .text_body("Hi $NAME$")
///     .token("NAME", "there")
///     .build()
///     .unwrap();
///
/// assert_eq!(message.recipients.len(), 2);
/// assert_eq!(message.text_body, "Hi there");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    recipients: Vec<String>,
    recipients_visible: bool,
    subject: String,
    text_body: Option<String>,
    html_body: Option<String>,
    text_content_type: Option<String>,
    html_content_type: Option<String>,
    template: Option<TemplateSource>,
    tokens: HashMap<String, String>,
}

impl MessageBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sender address
    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Add a recipient
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.recipients.push(recipient.into());
        self
    }

    /// Add every recipient from a `;`-separated list
    pub fn to_list(mut self, recipients: &str) -> Self {
        self.recipients.extend(
            recipients
                .split(';')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(String::from),
        );
        self
    }

    /// Whether recipients may see each other
    pub fn recipients_visible(mut self, visible: bool) -> Self {
        self.recipients_visible = visible;
        self
    }

    /// Set the subject line
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Set the plain text body
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.text_body = Some(body.into());
        self
    }

    /// Set the HTML body
    pub fn html_body(mut self, body: impl Into<String>) -> Self {
        self.html_body = Some(body.into());
        self
    }

    /// Override the plain text content type
    pub fn text_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.text_content_type = Some(content_type.into());
        self
    }

    /// Override the HTML content type
    pub fn html_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.html_content_type = Some(content_type.into());
        self
    }

    /// Fill any body not set explicitly from template `name`
    pub fn template(mut self, loader: &TemplateLoader, name: &str, language: Option<&str>) -> Self {
        self.template = Some(TemplateSource::Files {
            loader: loader.clone(),
            name: name.to_string(),
            language: language.map(String::from),
        });
        self
    }

    /// Fill any body not set explicitly from template `name` in `catalog`
    pub fn catalog_template(
        mut self,
        catalog: &TemplateCatalog,
        name: &str,
        language: Option<&str>,
    ) -> Self {
        let (text, html) = catalog.pair(name, language);
        self.template = Some(TemplateSource::Catalog { text, html });
        self
    }

    /// Add the request, recipient and sender tokens; tokens already set win
    pub fn base_tokens(
        mut self,
        requested_url: Option<&Url>,
        recipient: Option<&MessageUser>,
        sender: Option<&MessageUser>,
    ) -> Self {
        initialize_base_tokens(&mut self.tokens, requested_url, recipient, sender);
        self
    }

    /// Add the UTC and local date/time tokens; tokens already set win
    pub fn date_time_tokens(mut self) -> Self {
        initialize_date_time_tokens(&mut self.tokens);
        self
    }

    /// Add a substitution token
    pub fn token(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tokens.insert(key.into(), value.into());
        self
    }

    /// Add several substitution tokens
    pub fn tokens<I, K, V>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.tokens
            .extend(tokens.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Validate the addresses, resolve the template and substitute tokens.
    ///
    /// # Errors
    /// - [`MessageError::MissingSender`] if no sender was given
    /// - [`MessageError::NoRecipients`] if no recipient was given
    /// - [`MessageError::InvalidAddress`] if any address is malformed
    /// - [`MessageError::Template`] if the template cannot be read
    pub fn build(self) -> Result<Message, MessageError> {
        let from = self
            .from
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .ok_or(MessageError::MissingSender)?;
        let from = EmailAddress::new(from)?;

        let recipients = self
            .recipients
            .iter()
            .map(|r| EmailAddress::new(r))
            .collect::<Result<Vec<_>, _>>()?;

        let (mut text_body, mut html_body) = (self.text_body, self.html_body);

        if let Some(source) = self.template {
            let (text, html) = match source {
                TemplateSource::Files {
                    loader,
                    name,
                    language,
                } => loader.load_pair(&name, language.as_deref())?,
                TemplateSource::Catalog { text, html } => (text, html),
            };
            text_body.get_or_insert(text);
            html_body.get_or_insert(html);
        }

        let mut message = Message::new(from, recipients, self.subject)?;
        message.recipients_visible = self.recipients_visible;
        message.text_body = replace_tokens(&text_body.unwrap_or_default(), &self.tokens);
        message.html_body = replace_tokens(&html_body.unwrap_or_default(), &self.tokens);
        message.text_content_type = self
            .text_content_type
            .unwrap_or_else(|| DEFAULT_TEXT_CONTENT_TYPE.to_string());
        message.html_content_type = self
            .html_content_type
            .unwrap_or_else(|| DEFAULT_HTML_CONTENT_TYPE.to_string());

        Ok(message)
    }
}

/// A message described by a template held in a [`TemplateCatalog`]
#[derive(Debug, Clone, Default)]
pub struct MessageSettings {
    /// Sender address
    pub from: String,

    /// Recipient addresses
    pub to: Vec<String>,

    /// Subject line
    pub subject: String,

    /// Template name in the catalog
    pub template_name: String,

    /// Template language; [`DEFAULT_LANGUAGE`](super::templates::DEFAULT_LANGUAGE) when unset
    pub language: Option<String>,

    /// Plain text content type, `text/plain` when unset
    pub text_content_type: Option<String>,

    /// HTML content type, `text/html` when unset
    pub html_content_type: Option<String>,

    /// Substitution tokens
    pub tokens: HashMap<String, String>,
}

impl MessageSettings {
    /// Build the message, taking both bodies from `catalog`
    ///
    /// # Errors
    /// As [`MessageBuilder::build`].
    pub fn build(self, catalog: &TemplateCatalog) -> Result<Message, MessageError> {
        let mut builder = MessageBuilder::new()
            .from(self.from)
            .subject(self.subject)
            .catalog_template(catalog, &self.template_name, self.language.as_deref())
            .tokens(self.tokens);

        for recipient in self.to {
            builder = builder.to(recipient);
        }

        if let Some(content_type) = self.text_content_type {
            builder = builder.text_content_type(content_type);
        }

        if let Some(content_type) = self.html_content_type {
            builder = builder.html_content_type(content_type);
        }

        builder.build()
    }
}
