//! Message templates and token substitution.
//!
//! Templates live on disk as `<root>/<language>/<name>.txt` (plain text) and
//! `<root>/<language>/<name>.htm` (HTML), or in memory in a
//! [`TemplateCatalog`]. Tokens are written as `$NAME$` and matched
//! case-insensitively.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{Local, Utc};
use regex::{NoExpand, Regex};
use reqwest::Url;

use super::{errors::TemplateError, MessageUser};

/// Language used when none is requested, and the fallback when a localized
/// template is missing.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Well-known token names
pub mod tokens {
    /// Recipient user id
    pub const USER_ID: &str = "USERID";
    /// Recipient login name
    pub const USER_NAME: &str = "USERNAME";
    /// Recipient first name
    pub const FIRST_NAME: &str = "FIRSTNAME";
    /// Recipient last name
    pub const LAST_NAME: &str = "LASTNAME";
    /// Recipient first and last name
    pub const FULL_NAME: &str = "FULLNAME";
    /// Recipient email address
    pub const USER_EMAIL: &str = "USEREMAIL";
    /// Recipient profile picture URL
    pub const USER_PICTURE_URL: &str = "USERPICTUREURL";
    /// Recipient time zone
    pub const TIME_ZONE: &str = "TIMEZONE";
    /// Recipient locale
    pub const LOCALE: &str = "LOCALE";

    /// Sender login name
    pub const FROM_USER_NAME: &str = "FROMUSERNAME";
    /// Sender first name
    pub const FROM_FIRST_NAME: &str = "FROMFIRSTNAME";
    /// Sender first and last name
    pub const FROM_FULL_NAME: &str = "FROMFULLNAME";
    /// Sender email address
    pub const FROM_EMAIL: &str = "FROMEMAIL";

    /// The full URL of the request that triggered the message
    pub const REQUESTED_URL: &str = "REQUESTEDURL";
    /// Scheme, host and port of the requested URL
    pub const URL: &str = "URL";

    /// Current UTC date and time
    pub const UTC_DATE_TIME: &str = "UTCDATETIME";
    /// Current UTC date
    pub const UTC_DATE: &str = "UTCDATE";
    /// Current date and time
    pub const DATE_TIME: &str = "DATETIME";
    /// Current date
    pub const DATE: &str = "DATE";
    /// Current time
    pub const TIME: &str = "TIME";
}

const DATE_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";
const DATE_FORMAT: &str = "%m/%d/%Y";
const TIME_FORMAT: &str = "%H:%M";

/// Replaces every `$TOKEN$` in `content` with its value from `values`.
///
/// `DATETIME`, `DATE` and `TIME` (UTC) are always available unless `values`
/// defines them itself. Unknown tokens are left untouched.
pub fn replace_tokens(content: &str, values: &HashMap<String, String>) -> String {
    let now = Utc::now();
    let mut pairs: Vec<(String, String)> = vec![
        (
            tokens::DATE_TIME.to_string(),
            now.format(DATE_TIME_FORMAT).to_string(),
        ),
        (tokens::DATE.to_string(), now.format(DATE_FORMAT).to_string()),
        (tokens::TIME.to_string(), now.format(TIME_FORMAT).to_string()),
    ];
    pairs.retain(|(builtin, _)| !contains_token(values, builtin));
    pairs.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));

    substitute(content, pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

/// Replaces the recipient tokens in `content` with the details of `user`.
///
/// Only the user tokens are touched; nothing else is substituted.
pub fn replace_user_tokens(content: &str, user: &MessageUser) -> String {
    let full_name = user.full_name();

    substitute(
        content,
        [
            (tokens::USER_ID, user.user_id.as_str()),
            (tokens::USER_EMAIL, user.email.as_str()),
            (tokens::USER_NAME, user.user_name.as_str()),
            (tokens::FIRST_NAME, user.first_name.as_str()),
            (tokens::LAST_NAME, user.last_name.as_str()),
            (
                tokens::USER_PICTURE_URL,
                user.picture_url.as_deref().unwrap_or_default(),
            ),
            (tokens::TIME_ZONE, user.time_zone.as_str()),
            (tokens::LOCALE, user.locale.as_str()),
            (tokens::FULL_NAME, full_name.as_str()),
        ],
    )
}

/// Adds the request, recipient and sender tokens to `values`.
///
/// Tokens already present (compared case-insensitively) are kept.
///
/// # Arguments
/// * `requested_url` - Fills `REQUESTEDURL`, and `URL` with just its origin.
/// * `recipient` - Fills the recipient tokens (`USERID`, `USERNAME`, `FIRSTNAME`,
///   `FULLNAME`, `USEREMAIL`).
/// * `sender` - Fills the `FROM*` tokens.
pub fn initialize_base_tokens(
    values: &mut HashMap<String, String>,
    requested_url: Option<&Url>,
    recipient: Option<&MessageUser>,
    sender: Option<&MessageUser>,
) {
    if let Some(sender) = sender {
        insert_absent(values, tokens::FROM_USER_NAME, &sender.user_name);
        insert_absent(values, tokens::FROM_FIRST_NAME, &sender.first_name);
        insert_absent(values, tokens::FROM_FULL_NAME, sender.full_name());
        insert_absent(values, tokens::FROM_EMAIL, &sender.email);
    }

    if let Some(recipient) = recipient {
        insert_absent(values, tokens::USER_ID, &recipient.user_id);
        insert_absent(values, tokens::USER_NAME, &recipient.user_name);
        insert_absent(values, tokens::FIRST_NAME, &recipient.first_name);
        insert_absent(values, tokens::FULL_NAME, recipient.full_name());
        insert_absent(values, tokens::USER_EMAIL, &recipient.email);
    }

    if let Some(url) = requested_url {
        insert_absent(values, tokens::REQUESTED_URL, url.as_str());
        insert_absent(values, tokens::URL, url.origin().ascii_serialization());
    }
}

/// Adds `UTCDATETIME` and `UTCDATE` in UTC, and `DATETIME`, `DATE` and `TIME`
/// in local time, keeping any already present.
pub fn initialize_date_time_tokens(values: &mut HashMap<String, String>) {
    let utc = Utc::now();
    let local = Local::now();

    insert_absent(values, tokens::UTC_DATE_TIME, utc.format(DATE_TIME_FORMAT).to_string());
    insert_absent(values, tokens::UTC_DATE, utc.format(DATE_FORMAT).to_string());
    insert_absent(values, tokens::DATE_TIME, local.format(DATE_TIME_FORMAT).to_string());
    insert_absent(values, tokens::DATE, local.format(DATE_FORMAT).to_string());
    insert_absent(values, tokens::TIME, local.format(TIME_FORMAT).to_string());
}

fn contains_token(values: &HashMap<String, String>, name: &str) -> bool {
    values.keys().any(|k| k.eq_ignore_ascii_case(name))
}

fn insert_absent(values: &mut HashMap<String, String>, name: &str, value: impl Into<String>) {
    if !contains_token(values, name) {
        values.insert(name.to_string(), value.into());
    }
}

fn substitute<'a, I>(content: &str, values: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    values.into_iter().fold(content.to_string(), |current, (key, value)| {
        let pattern = format!(r"(?i)\${}\$", regex::escape(key));

        match Regex::new(&pattern) {
            Ok(re) => re.replace_all(&current, NoExpand(value)).into_owned(),
            Err(_) => current,
        }
    })
}

/// Which body a template provides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Plain text, `.txt`
    Text,

    /// HTML, `.htm`
    Html,
}

impl BodyKind {
    fn suffix(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Html => "htm",
        }
    }
}

/// Catalog key of a template: `{name}_{language}_txt` or `{name}_{language}_htm`
pub fn catalog_key(name: &str, language: &str, kind: BodyKind) -> String {
    format!("{name}_{language}_{}", kind.suffix())
}

/// A template body held in memory, e.g. loaded from a database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Lookup key, see [`catalog_key`]
    pub key: String,

    /// Language code, e.g. `en-US`
    pub language: String,

    /// The template text
    pub content: String,
}

impl Template {
    /// Create the `kind` body of template `name` in `language`
    pub fn new(name: &str, language: &str, kind: BodyKind, content: impl Into<String>) -> Self {
        Self {
            key: catalog_key(name, language, kind),
            language: language.to_string(),
            content: content.into(),
        }
    }
}

/// In-memory set of templates looked up by key.
///
/// Unlike [`TemplateLoader`] there is no fallback to [`DEFAULT_LANGUAGE`]: a
/// language without its own template gets an empty body.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<Template>,
}

impl TemplateCatalog {
    /// Create a catalog from `templates`
    pub fn new(templates: Vec<Template>) -> Self {
        Self { templates }
    }

    /// Add a template
    pub fn insert(&mut self, template: Template) {
        self.templates.push(template);
    }

    /// Content of the first template with `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.templates
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.content.as_str())
    }

    /// The `(text, html)` pair for template `name`; missing bodies are empty
    pub fn pair(&self, name: &str, language: Option<&str>) -> (String, String) {
        let language = language.unwrap_or(DEFAULT_LANGUAGE);
        let body = |kind| {
            self.get(&catalog_key(name, language, kind))
                .unwrap_or_default()
                .to_string()
        };

        (body(BodyKind::Text), body(BodyKind::Html))
    }
}

/// Loads plain text and HTML templates from a directory tree
#[derive(Debug, Clone)]
pub struct TemplateLoader {
    root: PathBuf,
}

impl TemplateLoader {
    /// Create a loader rooted at `root`.
    ///
    /// # Errors
    /// [`TemplateError::DirectoryNotFound`] if `root` is not an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, TemplateError> {
        let root = root.into();

        if !root.is_dir() {
            return Err(TemplateError::DirectoryNotFound(root));
        }

        Ok(Self { root })
    }

    /// Loads a single template file, falling back to [`DEFAULT_LANGUAGE`] when
    /// the localized file is missing. A template that exists in neither
    /// language yields an empty string.
    pub fn load(&self, file_name: &str, language: Option<&str>) -> Result<String, TemplateError> {
        let language = language.unwrap_or(DEFAULT_LANGUAGE);

        if let Some(content) = read_optional(&self.root.join(language).join(file_name))? {
            return Ok(content);
        }

        if language != DEFAULT_LANGUAGE {
            if let Some(content) =
                read_optional(&self.root.join(DEFAULT_LANGUAGE).join(file_name))?
            {
                return Ok(content);
            }
        }

        Ok(String::new())
    }

    /// Loads the `(text, html)` pair for template `name`
    pub fn load_pair(
        &self,
        name: &str,
        language: Option<&str>,
    ) -> Result<(String, String), TemplateError> {
        let text = self.load(&format!("{name}.txt"), language)?;
        let html = self.load(&format!("{name}.htm"), language)?;

        Ok((text, html))
    }

    /// Loads and renders the `(text, html)` pair for template `name`
    pub fn render_pair(
        &self,
        name: &str,
        language: Option<&str>,
        tokens: &HashMap<String, String>,
    ) -> Result<(String, String), TemplateError> {
        let (text, html) = self.load_pair(name, language)?;

        Ok((replace_tokens(&text, tokens), replace_tokens(&html, tokens)))
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, TemplateError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(TemplateError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}
