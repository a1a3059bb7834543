//! Reusable message buffer.
//!
//! The headers of a notification never change for a given identity, so they
//! are written once and every send only appends the subject and body after
//! them. The buffer is truncated back to the header prefix after each send,
//! keeping its allocation.

use std::ops::Deref;

/// Initial buffer capacity; large enough for typical notifications.
pub const DEFAULT_CAPACITY: usize = 3000;

/// A recipient as it appears in the `To` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub name: Option<String>,
    pub email: String,
}

impl Destination {
    pub fn new(name: Option<&str>, email: impl Into<String>) -> Self {
        Self {
            name: name.filter(|n| !n.is_empty()).map(str::to_owned),
            email: email.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Composer {
    buf: Vec<u8>,
    prefix_len: usize,
}

impl Composer {
    /// Builds the header block for a sender and its recipients.
    #[must_use]
    pub fn new(display_name: &str, from: &str, destinations: &[Destination]) -> Self {
        let mut composer = Self {
            buf: Vec::with_capacity(DEFAULT_CAPACITY),
            prefix_len: 0,
        };
        composer.prefix_len = composer.write_headers(display_name, from, destinations);
        composer
    }

    /// Writes everything up to and including `Subject: ` and returns the
    /// offset where the per-send tail starts.
    fn write_headers(&mut self, display_name: &str, from: &str, destinations: &[Destination]) -> usize {
        self.write(b"From: ");
        self.write_mailbox(Some(display_name), from);
        self.write(b"\r\nContent-Type: text/plain; charset=UTF-8\r\nTo: ");
        for (i, destination) in destinations.iter().enumerate() {
            if i > 0 {
                self.write(b", ");
            }
            self.write_mailbox(destination.name.as_deref(), &destination.email);
        }
        self.write(b"\r\nSubject: ");
        self.buf.len()
    }

    fn write(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// `Name <addr>`, or `<addr>` when there is no name.
    fn write_mailbox(&mut self, name: Option<&str>, email: &str) {
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            self.write(name.as_bytes());
            self.write(b" ");
        }
        self.write(b"<");
        self.write(email.as_bytes());
        self.write(b">");
    }

    /// Appends the subject, the header/body separator and the body.
    ///
    /// Line breaks in the subject are replaced with spaces so it cannot start
    /// a new header.
    pub fn append(&mut self, subject: &str, body: &[u8]) {
        self.buf.reserve(subject.len() + body.len() + 4);
        self.buf.extend(
            subject
                .bytes()
                .map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b }),
        );
        self.write(b"\r\n\r\n");
        self.write(body);
    }

    /// Truncates back to the header prefix. The allocation is kept.
    pub fn reset(&mut self) {
        self.buf.truncate(self.prefix_len);
    }

    /// Appends `subject` and `body` and returns a guard that resets the
    /// buffer when dropped.
    pub fn compose(&mut self, subject: &str, body: &[u8]) -> Draft<'_> {
        self.append(subject, body);
        Draft(self)
    }

    #[must_use]
    pub const fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// A composed message. Dropping it truncates the composer back to its
/// header prefix.
pub struct Draft<'a>(&'a mut Composer);

impl Deref for Draft<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Drop for Draft<'_> {
    fn drop(&mut self) {
        self.0.reset();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn composer() -> Composer {
        Composer::new(
            "systemd",
            "alerts@x.com",
            &[
                Destination::new(Some("Ann"), "a@x.com"),
                Destination::new(Some(""), "b@x.com"),
            ],
        )
    }

    #[test]
    fn header_prefix() {
        let composer = composer();
        assert_eq!(
            String::from_utf8_lossy(composer.as_bytes()),
            "From: systemd <alerts@x.com>\r\n\
             Content-Type: text/plain; charset=UTF-8\r\n\
             To: Ann <a@x.com>, <b@x.com>\r\n\
             Subject: "
        );
        assert_eq!(composer.prefix_len(), composer.len());
    }

    #[test]
    fn unnamed_destination_has_no_name() {
        let composer = composer();
        let text = String::from_utf8_lossy(composer.as_bytes()).into_owned();
        assert!(text.contains("To: Ann <a@x.com>, <b@x.com>\r\n"));
        assert!(!text.contains(" <b@x.com>,"));
    }

    #[test]
    fn append_then_reset() {
        let mut composer = composer();
        let prefix = composer.prefix_len();
        let capacity = composer.capacity();

        composer.append("unit failed", b"nginx.service entered failed state");
        assert!(
            composer
                .as_bytes()
                .ends_with(b"Subject: unit failed\r\n\r\nnginx.service entered failed state")
        );

        composer.reset();
        assert_eq!(composer.len(), prefix);
        assert_eq!(composer.capacity(), capacity);
    }

    #[test]
    fn draft_resets_on_drop() {
        let mut composer = composer();
        let prefix = composer.prefix_len();
        {
            let draft = composer.compose("s", b"body");
            assert_eq!(draft.len(), prefix + "s\r\n\r\nbody".len());
        }
        assert_eq!(composer.len(), prefix);

        // A second send starts from the same prefix.
        let draft = composer.compose("t", b"other");
        assert!(draft.ends_with(b"Subject: t\r\n\r\nother"));
    }

    #[test]
    fn subject_cannot_inject_headers() {
        let mut composer = composer();
        let draft = composer.compose("a\r\nBcc: evil@x.com", b"");
        assert!(draft.ends_with(b"Subject: a  Bcc: evil@x.com\r\n\r\n"));
    }
}
