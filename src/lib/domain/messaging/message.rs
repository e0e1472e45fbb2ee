//! Outbound message

use serde::{Deserialize, Serialize};

use super::{errors::MessageError, EmailAddress};

/// Content type used for the plain text body unless overridden
pub const DEFAULT_TEXT_CONTENT_TYPE: &str = "text/plain";

/// Content type used for the HTML body unless overridden
pub const DEFAULT_HTML_CONTENT_TYPE: &str = "text/html";

/// An outbound message.
///
/// This is the unit of work that moves through the queue, the worker and the
/// spool. Every field is persisted when the message is spilled to disk, and
/// reading it back goes through the same checks as [`Message::new`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MessageRecord")]
pub struct Message {
    /// The sender
    pub from: EmailAddress,

    /// The recipients, in the order they were given
    pub recipients: Vec<EmailAddress>,

    /// Whether recipients may see each other. When `false` the message is
    /// meant to be split into one send per recipient before it is queued.
    pub recipients_visible: bool,

    /// The subject line
    pub subject: String,

    /// The plain text body, possibly empty
    pub text_body: String,

    /// The HTML body, possibly empty
    pub html_body: String,

    /// Content type of the plain text body
    pub text_content_type: String,

    /// Content type of the HTML body
    pub html_content_type: String,
}

/// Unchecked wire form of a [`Message`]
#[derive(Deserialize)]
struct MessageRecord {
    from: EmailAddress,
    recipients: Vec<EmailAddress>,
    recipients_visible: bool,
    subject: String,
    text_body: String,
    html_body: String,
    text_content_type: String,
    html_content_type: String,
}

impl TryFrom<MessageRecord> for Message {
    type Error = MessageError;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        let mut message = Message::new(record.from, record.recipients, record.subject)?;
        message.recipients_visible = record.recipients_visible;
        message.text_body = record.text_body;
        message.html_body = record.html_body;
        message.text_content_type = record.text_content_type;
        message.html_content_type = record.html_content_type;

        Ok(message)
    }
}

impl Message {
    /// Creates a message with empty bodies and default content types.
    ///
    /// # Errors
    /// [`MessageError::NoRecipients`] if `recipients` is empty.
    pub fn new(
        from: EmailAddress,
        recipients: Vec<EmailAddress>,
        subject: impl Into<String>,
    ) -> Result<Self, MessageError> {
        if recipients.is_empty() {
            return Err(MessageError::NoRecipients);
        }

        Ok(Self {
            from,
            recipients,
            recipients_visible: false,
            subject: subject.into(),
            text_body: String::new(),
            html_body: String::new(),
            text_content_type: DEFAULT_TEXT_CONTENT_TYPE.to_string(),
            html_content_type: DEFAULT_HTML_CONTENT_TYPE.to_string(),
        })
    }

    /// Whether the message carries a non-blank HTML body
    pub fn is_html(&self) -> bool {
        !self.html_body.trim().is_empty()
    }

    /// Splits the message into independent single-recipient messages.
    ///
    /// Messages whose recipients are visible to each other, or that only have
    /// one recipient, are returned unchanged.
    pub fn split_recipients(self) -> Vec<Message> {
        if self.recipients_visible || self.recipients.len() <= 1 {
            return vec![self];
        }

        self.recipients
            .iter()
            .map(|recipient| Message {
                recipients: vec![recipient.clone()],
                ..self.clone()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn address(raw: &str) -> EmailAddress {
        EmailAddress::new(raw).expect("valid test address")
    }

    #[test]
    fn test_new_message_requires_recipients() {
        let result = Message::new(address("from@example.com"), vec![], "subject");

        assert!(matches!(result, Err(MessageError::NoRecipients)));
    }

    #[test]
    fn test_new_message_defaults() -> TestResult {
        let message = Message::new(
            address("from@example.com"),
            vec![address("to@example.com")],
            "subject",
        )?;

        assert_eq!(message.text_content_type, "text/plain");
        assert_eq!(message.html_content_type, "text/html");
        assert!(!message.recipients_visible);
        assert!(!message.is_html());

        Ok(())
    }

    #[test]
    fn test_blank_html_body_is_not_html() -> TestResult {
        let mut message = Message::new(
            address("from@example.com"),
            vec![address("to@example.com")],
            "subject",
        )?;
        message.html_body = "  \n".to_string();

        assert!(!message.is_html());

        message.html_body = "<p>hi</p>".to_string();

        assert!(message.is_html());

        Ok(())
    }

    #[test]
    fn test_split_hidden_recipients() -> TestResult {
        let message = Message::new(
            address("from@example.com"),
            vec![address("a@x.com"), address("b@x.com")],
            "subject",
        )?;

        let split = message.split_recipients();

        assert_eq!(split.len(), 2);
        assert_eq!(split[0].recipients, vec![address("a@x.com")]);
        assert_eq!(split[1].recipients, vec![address("b@x.com")]);
        assert!(split.iter().all(|m| m.subject == "subject"));

        Ok(())
    }

    #[test]
    fn test_visible_recipients_are_not_split() -> TestResult {
        let mut message = Message::new(
            address("from@example.com"),
            vec![address("a@x.com"), address("b@x.com")],
            "subject",
        )?;
        message.recipients_visible = true;

        let split = message.split_recipients();

        assert_eq!(split.len(), 1);
        assert_eq!(split[0].recipients.len(), 2);

        Ok(())
    }

    #[test]
    fn test_serialization_preserves_every_field() -> TestResult {
        let mut message = Message::new(
            address("from@example.com"),
            vec![address("b@x.com"), address("a@x.com")],
            "Greetings",
        )?;
        message.text_body = "hello".to_string();
        message.html_body = "<b>hello</b>".to_string();
        message.text_content_type = "text/plain; charset=utf-8".to_string();
        message.html_content_type = "text/html; charset=utf-8".to_string();
        message.recipients_visible = true;

        let restored: Message = serde_json::from_str(&serde_json::to_string(&message)?)?;

        assert_eq!(restored, message);
        assert_eq!(restored.recipients[0].as_str(), "b@x.com");

        Ok(())
    }

    #[test]
    fn test_deserializing_without_recipients_fails() -> TestResult {
        let message = Message::new(
            address("from@example.com"),
            vec![address("to@example.com")],
            "subject",
        )?;

        let mut value = serde_json::to_value(&message)?;
        value["recipients"] = serde_json::json!([]);

        let result = serde_json::from_value::<Message>(value);

        assert!(result.is_err());

        Ok(())
    }
}
