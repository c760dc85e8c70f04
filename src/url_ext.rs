//! Query and fragment plumbing shared by the flow machine, the browser
//! agent and tests.

use std::borrow::Cow;
use std::collections::HashMap;

use url::form_urlencoded;
use url::Url;

/// Append `pairs` to the URL query, percent-encoded. Pre-existing query
/// items are preserved byte-for-byte, including their order, duplicates and
/// empty values.
pub fn append_query_pairs<'p>(url: &mut Url, pairs: impl IntoIterator<Item = (&'p str, &'p str)>) {
    let mut query = url.query_pairs_mut();
    for (key, value) in pairs {
        query.append_pair(key, value);
    }
}

/// Append `pairs` to the URL fragment, treating the fragment as a query
/// string. The actual query is left untouched.
pub fn append_fragment_pairs<'p>(
    url: &mut Url,
    pairs: impl IntoIterator<Item = (&'p str, &'p str)>,
) {
    let existing = url.fragment().unwrap_or_default().to_owned();
    let mut serializer = form_urlencoded::Serializer::for_suffix(existing, 0);
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    let fragment = serializer.finish();
    url.set_fragment(Some(&fragment));
}

/// Flatten the URL query into a map. The first occurrence of a key wins and
/// missing values are normalized to empty strings.
pub fn query_map(url: &Url) -> HashMap<String, String> {
    pairs_into_map(url.query_pairs())
}

/// Flatten the URL fragment into a map, parsed as if it were a query string.
pub fn fragment_map(url: &Url) -> HashMap<String, String> {
    match url.fragment() {
        Some(fragment) => pairs_into_map(form_urlencoded::parse(fragment.as_bytes())),
        None => HashMap::new(),
    }
}

/// Whether two URLs address the same redirect target: scheme, userinfo,
/// host, port and path must be equal; query and fragment are ignored.
pub fn looks_like(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.username() == b.username()
        && a.password() == b.password()
        && a.host_str() == b.host_str()
        && a.port() == b.port()
        && a.path() == b.path()
}

fn pairs_into_map<'i>(
    pairs: impl Iterator<Item = (Cow<'i, str>, Cow<'i, str>)>,
) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (key, value) in pairs {
        map.entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    map
}
