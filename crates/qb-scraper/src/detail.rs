use chrono::{DateTime, Utc};
use serde_json::Value;

/// A detail payload normalized from the upstream's flat `payload` object.
/// Null/missing upstream values are preserved as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailPayload {
    pub description: Option<String>,
    pub address: Option<String>,
    pub close_at: Option<DateTime<Utc>>,
    pub second_call_close_at: Option<DateTime<Utc>>,
    pub products: Option<Value>,
    pub state_text: Option<String>,
    pub state_tag: Option<i32>,
    pub bidder_count: Option<i32>,
    pub lead_time_days: Option<i32>,
}

/// Normalizes a decoded detail `payload` object. If the upstream doesn't
/// give a state text but does give a desertion reason, the tender is
/// considered deserted and state text is forced to "Desierta".
pub fn normalize_detail_payload(payload: &Value) -> DetailPayload {
    let state_text = payload
        .get("estado")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            payload
                .get("motivo_desierta")
                .and_then(Value::as_str)
                .map(|_| "Desierta".to_string())
        });

    DetailPayload {
        description: payload.get("descripcion").and_then(Value::as_str).map(str::to_string),
        address: payload
            .get("direccion_entrega")
            .and_then(Value::as_str)
            .map(str::to_string),
        close_at: payload
            .get("fecha_cierre")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        second_call_close_at: payload
            .get("fecha_segundo_llamado")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        products: payload.get("productos").cloned(),
        state_text,
        state_tag: payload.get("codigo_estado").and_then(Value::as_i64).map(|v| v as i32),
        bidder_count: payload
            .get("cantidad_provedores_cotizando")
            .and_then(Value::as_i64)
            .map(|v| v as i32),
        lead_time_days: payload.get("plazo_entrega").and_then(Value::as_i64).map(|v| v as i32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_present_fields() {
        let payload = json!({
            "descripcion": "Compra de insumos",
            "direccion_entrega": "Calle Falsa 123",
            "estado": "Publicada",
            "cantidad_provedores_cotizando": 4,
            "codigo_estado": 1,
        });
        let detail = normalize_detail_payload(&payload);
        assert_eq!(detail.description.as_deref(), Some("Compra de insumos"));
        assert_eq!(detail.state_text.as_deref(), Some("Publicada"));
        assert_eq!(detail.bidder_count, Some(4));
    }

    #[test]
    fn falls_back_to_desierta_when_desertion_reason_present() {
        let payload = json!({
            "motivo_desierta": "Sin oferentes",
        });
        let detail = normalize_detail_payload(&payload);
        assert_eq!(detail.state_text.as_deref(), Some("Desierta"));
    }

    #[test]
    fn missing_values_stay_none() {
        let payload = json!({});
        let detail = normalize_detail_payload(&payload);
        assert_eq!(detail, DetailPayload::default());
    }

    #[test]
    fn explicit_state_wins_over_desertion_reason() {
        let payload = json!({
            "estado": "Adjudicada",
            "motivo_desierta": "Sin oferentes",
        });
        let detail = normalize_detail_payload(&payload);
        assert_eq!(detail.state_text.as_deref(), Some("Adjudicada"));
    }
}
