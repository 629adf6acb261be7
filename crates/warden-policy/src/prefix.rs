//! Longest-prefix selection over path-keyed maps.

/// Select the entry whose key is the longest string prefix of `path`.
///
/// Keys are plain string prefixes: `/admin` selects `/administrator` too.
pub fn longest_prefix<'a, K, V, I>(entries: I, path: &str) -> Option<(&'a K, &'a V)>
where
    K: AsRef<str> + 'a,
    V: 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    entries
        .into_iter()
        .filter(|(key, _)| path.starts_with(key.as_ref()))
        .max_by_key(|(key, _)| key.as_ref().len())
}
