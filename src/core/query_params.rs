use std::collections::HashMap;

/// Parse query parameters from a URI string
///
/// Handles URL decoding and returns a HashMap of parameter key-value pairs.
/// Multiple values for the same key are not supported (only the last is kept).
///
/// # Example
/// ```
/// use snapbord::core::query_params::parse_query_params;
///
/// let params = parse_query_params("/@alice/?sort=popular&page_number=2");
/// assert_eq!(params.get("sort"), Some(&"popular".to_string()));
/// assert_eq!(params.get("page_number"), Some(&"2".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    match uri.find('?') {
        Some(query_start) => parse_pairs(&uri[query_start + 1..]),
        None => HashMap::new(),
    }
}

/// Parse an `application/x-www-form-urlencoded` request body.
pub fn parse_form(body: &[u8]) -> HashMap<String, String> {
    parse_pairs(&String::from_utf8_lossy(body))
}

fn parse_pairs(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for param in query.split('&').filter(|p| !p.is_empty()) {
        if let Some(eq_idx) = param.find('=') {
            let key = decode(&param[..eq_idx]);
            params.insert(key, decode(&param[eq_idx + 1..]));
        } else {
            // Flag parameter without value
            params.insert(decode(param), String::new());
        }
    }

    params
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Non-empty value of a parameter, mirroring how a form treats blank inputs.
pub fn get_present<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

/// Whether a switch parameter carries a value (`?delete=1`). A bare `?delete`
/// or an empty `?delete=` is off.
pub fn is_set(params: &HashMap<String, String>, key: &str) -> bool {
    get_present(params, key).is_some()
}

/// Get a boolean flag parameter (e.g., ?darkmode=true)
pub fn get_bool_flag(params: &HashMap<String, String>, key: &str) -> bool {
    params.get(key)
        .map(|v| v == "true")
        .unwrap_or(false)
}

/// Requested page number. Missing or non-numeric values ask for the first
/// page; zero and negatives ask for the last one, which `paginate` clamps to.
pub fn get_page_number(params: &HashMap<String, String>, key: &str) -> usize {
    match params.get(key).map(|s| s.trim().parse::<i64>()) {
        Some(Ok(n)) if n < 1 => usize::MAX,
        Some(Ok(n)) => usize::try_from(n).unwrap_or(usize::MAX),
        _ => 1,
    }
}
