use crate::common::data::HttpRequest;

/// The part of a request a key/value matcher reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyValueSource {
    Header,
    QueryParameter,
    Cookie,
}

impl KeyValueSource {
    /// The name of the matcher field in the wire format.
    pub(crate) fn field_name(&self) -> &'static str {
        match self {
            KeyValueSource::Header => "headers",
            KeyValueSource::QueryParameter => "queryStringParameters",
            KeyValueSource::Cookie => "cookies",
        }
    }

    /// All values the request carries for `name`. Header names are case-insensitive,
    /// query parameter and cookie names are not.
    pub(crate) fn values<'a>(&self, req: &'a HttpRequest, name: &str) -> Vec<&'a str> {
        match self {
            KeyValueSource::Header => req.header_values(name),
            KeyValueSource::QueryParameter => find_all(&req.query, name),
            KeyValueSource::Cookie => find_all(&req.cookies, name),
        }
    }
}

fn find_all<'a>(pairs: &'a [(String, String)], name: &str) -> Vec<&'a str> {
    pairs
        .iter()
        .filter(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .collect()
}
