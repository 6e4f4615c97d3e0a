/// Splits a null-terminated argument run into owned strings, dropping the
/// single trailing empty segment produced by the final terminator.
pub fn split_args(body: &[u8]) -> Vec<String> {
    let mut parts: Vec<String> = body
        .split(|&b| b == 0)
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect();
    if parts.last().is_some_and(|s| s.is_empty()) {
        parts.pop();
    }
    parts
}
