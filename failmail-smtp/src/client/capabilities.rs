//! Extensions advertised in an EHLO reply.

use super::response::Response;

/// The ESMTP keywords a server advertised after EHLO.
///
/// The first EHLO line is the server's greeting text and is not a keyword.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    keywords: Vec<(String, Vec<String>)>,
}

impl Capabilities {
    #[must_use]
    pub fn from_ehlo(response: &Response) -> Self {
        let keywords = response
            .lines
            .iter()
            .skip(1)
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let keyword = parts.next()?;

                // Some servers still announce the pre-RFC 4954 `AUTH=PLAIN` form.
                if let Some((keyword, params)) = keyword.split_once('=') {
                    let mut params: Vec<String> = params.split(',').map(str::to_owned).collect();
                    params.extend(parts.map(str::to_owned));
                    return Some((keyword.to_ascii_uppercase(), params));
                }

                Some((
                    keyword.to_ascii_uppercase(),
                    parts.map(str::to_owned).collect(),
                ))
            })
            .collect();

        Self { keywords }
    }

    /// Returns `true` if `keyword` was advertised (case-insensitive).
    #[must_use]
    pub fn supports(&self, keyword: &str) -> bool {
        self.keywords
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(keyword))
    }

    #[must_use]
    pub fn starttls(&self) -> bool {
        self.supports("STARTTLS")
    }

    #[must_use]
    pub fn auth(&self) -> bool {
        self.supports("AUTH")
    }

    /// Returns `true` if `mechanism` is among the advertised AUTH mechanisms.
    #[must_use]
    pub fn auth_mechanism(&self, mechanism: &str) -> bool {
        self.keywords
            .iter()
            .filter(|(k, _)| k == "AUTH")
            .flat_map(|(_, params)| params)
            .any(|m| m.eq_ignore_ascii_case(mechanism))
    }
}
