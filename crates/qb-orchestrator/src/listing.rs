use chrono::{DateTime, NaiveDate, Utc};
use qb_repo::TenderUpsert;
use serde_json::Value;

/// Maps one raw listing item (decoded JSON from the upstream API) to a
/// repository-ready upsert row. Returns `None` if the item is missing a
/// field with no sane default (code, name, organism, close date).
pub fn parse_listing_item(raw: &Value) -> Option<TenderUpsert> {
    let code = raw.get("codigo")?.as_str()?.to_string();
    let name = raw.get("nombre")?.as_str()?.to_string();
    let organism_name = raw.get("organismo")?.as_str()?.to_string();
    let close_at = raw
        .get("fecha_cierre")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))?;

    let publication_date = raw
        .get("fecha_publicacion")
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .unwrap_or_else(|| close_at.date_naive());

    let second_call_close_at = raw
        .get("fecha_segundo_llamado")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let amount = raw.get("monto_disponible_CLP").and_then(Value::as_i64);
    let state_text = raw
        .get("estado")
        .and_then(Value::as_str)
        .unwrap_or("Publicada")
        .to_string();
    let state_tag = raw.get("codigo_estado").and_then(Value::as_i64).unwrap_or(1) as i32;
    let bidder_count = raw
        .get("cantidad_provedores_cotizando")
        .and_then(Value::as_i64)
        .unwrap_or(0) as i32;

    Some(TenderUpsert {
        code,
        name,
        amount,
        publication_date,
        close_at,
        second_call_close_at,
        state_text,
        state_tag,
        bidder_count,
        organism_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_complete_listing_item() {
        let raw = json!({
            "codigo": "L1-2024",
            "nombre": "Compra X",
            "organismo": "Ministerio A",
            "monto_disponible_CLP": 1_000_000,
            "estado": "Publicada",
            "fecha_cierre": "2026-02-01T23:59:00Z",
            "fecha_publicacion": "2026-01-01",
            "cantidad_provedores_cotizando": 2,
        });
        let upsert = parse_listing_item(&raw).unwrap();
        assert_eq!(upsert.code, "L1-2024");
        assert_eq!(upsert.amount, Some(1_000_000));
        assert_eq!(upsert.bidder_count, 2);
    }

    #[test]
    fn rejects_item_missing_code() {
        let raw = json!({"nombre": "Compra X", "organismo": "Ministerio A"});
        assert!(parse_listing_item(&raw).is_none());
    }

    #[test]
    fn defaults_state_text_when_absent() {
        let raw = json!({
            "codigo": "L2-2024",
            "nombre": "Compra Y",
            "organismo": "Ministerio B",
            "fecha_cierre": "2026-02-01T23:59:00Z",
        });
        let upsert = parse_listing_item(&raw).unwrap();
        assert_eq!(upsert.state_text, "Publicada");
    }
}
