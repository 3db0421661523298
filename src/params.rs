//! Request parameter grammar and URL helpers.
//!
//! The grammar parses `k1=v1<d>k2=v2<d>...` strings where `<d>` is a single
//! ASCII delimiter: `&` for query strings and form bodies, `;` for cookies.
//! Keys and values are percent-decoded with `+` mapped to space, surrounding
//! spaces are stripped, and duplicate keys promote into the multi-valued map
//! (the first duplicate moves the prior value along with the new one).

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::Rng;
use std::collections::BTreeMap;

/// Characters that survive [`encode_url`] unescaped (RFC 3986 unreserved).
const URL_ESCAPED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Alphabet for random identifiers such as session ids.
pub(crate) const ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz\
ABCDEFGHIJKLMNOPQRSTUVWXYZ\
1234567890";

/// Single-valued parameters, keyed by decoded name.
pub type ParamMap = BTreeMap<String, String>;
/// Multi-valued parameters, keyed by decoded name.
pub type ParamListMap = BTreeMap<String, Vec<String>>;

/// Percent-decode one key or value, mapping `+` to space first.
fn decode_component(s: &str) -> String {
    let plused = s.replace('+', " ");
    percent_decode_str(&plused).decode_utf8_lossy().into_owned()
}

/// Percent-encode everything outside the unreserved set.
pub fn encode_url(s: &str) -> String {
    utf8_percent_encode(s, URL_ESCAPED).to_string()
}

/// Parse a delimited parameter string into its single-valued and
/// multi-valued maps.
///
/// `=` toggles between key and value accumulation; a bare `=`-less segment
/// therefore contributes a key with an empty value. Empty segments are
/// skipped entirely.
pub fn parse_params(s: &str, delimiter: char) -> (ParamMap, ParamListMap) {
    let mut dict = ParamMap::new();
    let mut list = ParamListMap::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    // Trailing delimiter so the last pair is handled like every other.
    for c in s.chars().chain(std::iter::once(delimiter)) {
        if c == '=' {
            in_value = !in_value;
        } else if c == delimiter {
            in_value = false;
            while key.ends_with(' ') {
                key.pop();
            }
            while value.ends_with(' ') {
                value.pop();
            }
            if key.is_empty() && value.is_empty() {
                continue;
            }
            let k = decode_component(&key);
            let v = decode_component(&value);
            key.clear();
            value.clear();
            if let Some(existing) = list.get_mut(&k) {
                existing.push(v);
            } else if let Some(prior) = dict.remove(&k) {
                list.insert(k, vec![prior, v]);
            } else {
                dict.insert(k, v);
            }
        } else {
            let target = if in_value { &mut value } else { &mut key };
            if target.is_empty() && c == ' ' {
                continue;
            }
            target.push(c);
        }
    }
    (dict, list)
}

/// Split a request target at the first `?` and parse the query string.
///
/// Returns the bare URL plus the query's single- and multi-valued maps.
pub fn parse_url(target: &str) -> (String, ParamMap, ParamListMap) {
    match target.split_once('?') {
        Some((url, query)) => {
            let (dict, list) = parse_params(query, '&');
            (url.to_string(), dict, list)
        }
        None => (target.to_string(), ParamMap::new(), ParamListMap::new()),
    }
}

/// Random `[A-Za-z0-9]` string of the given length.
pub fn generate_random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ID_CHARS[rng.gen_range(0..ID_CHARS.len())] as char)
        .collect()
}
