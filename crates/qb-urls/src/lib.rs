use chrono::NaiveDate;

/// Pure, stateless assembly of the two upstream endpoints the scraper calls.
/// Neither builder performs I/O or validation beyond what's documented here.

/// Builds a listing-page URL.
///
/// `region` is deliberately not a parameter: the upstream API rejects date
/// filters when a region is also set, so listing calls never send one.
pub fn list_url(base_api: &str, page_number: u32, date_from: NaiveDate, date_to: NaiveDate) -> String {
    format!(
        "{base}/compra-agil?status=2&order_by=recent&page_number={page}&date_from={from}&date_to={to}",
        base = base_api.trim_end_matches('/'),
        page = page_number,
        from = date_from.format("%Y-%m-%d"),
        to = date_to.format("%Y-%m-%d"),
    )
}

/// Builds a detail-page URL for a single tender code.
///
/// Codes are inserted raw. Callers guarantee they are well-formed; the
/// upstream accepts raw codes with no percent-encoding edge cases.
pub fn detail_url(base_api: &str, code: &str) -> String {
    format!(
        "{base}/compra-agil?action=ficha&code={code}",
        base = base_api.trim_end_matches('/'),
        code = code,
    )
}
