mod common;

use chrono::{Duration, NaiveDate, Utc};
use qb_repo::{DetailRecord, Repository, TenderUpsert};

fn sample_upsert(code: &str, organism: &str, state_text: &str) -> TenderUpsert {
    TenderUpsert {
        code: code.to_string(),
        name: "Compra de notebooks".to_string(),
        amount: Some(500_000),
        publication_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
        close_at: Utc::now() + Duration::days(10),
        second_call_close_at: None,
        state_text: state_text.to_string(),
        state_tag: 1,
        bidder_count: 0,
        organism_name: organism.to_string(),
    }
}

#[tokio::test]
async fn bulk_upsert_creates_organism_and_tender() {
    let (_container, pool) = common::postgres_pool().await;
    let repo = Repository::new(pool);

    let items = vec![sample_upsert("TENDER-1", "Municipalidad de Ejemplo", "Publicada")];
    let affected = repo.bulk_upsert_tenders(&items).await.unwrap();
    assert_eq!(affected, 1);

    let organisms = repo.list_organisms().await.unwrap();
    assert_eq!(organisms.len(), 1);
    assert_eq!(organisms[0].name, "Municipalidad de Ejemplo");
    assert!(organisms[0].is_new);

    let candidates = repo.candidates_for_score_recompute().await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].code, "TENDER-1");
}

#[tokio::test]
async fn bulk_upsert_never_overwrites_static_fields() {
    let (_container, pool) = common::postgres_pool().await;
    let repo = Repository::new(pool);

    let first = vec![sample_upsert("TENDER-2", "Municipalidad A", "Publicada")];
    repo.bulk_upsert_tenders(&first).await.unwrap();

    let mut second_item = sample_upsert("TENDER-2", "Municipalidad A", "Adjudicada");
    second_item.name = "Nombre distinto, no deberia aplicarse".to_string();
    second_item.bidder_count = 7;
    repo.bulk_upsert_tenders(&[second_item]).await.unwrap();

    let candidates = repo.candidates_for_score_recompute().await.unwrap();
    let tender = candidates.iter().find(|c| c.code == "TENDER-2").unwrap();
    // Name is static: the original value survives the conflict update.
    assert_eq!(tender.name, "Compra de notebooks");
    // State text is dynamic: the second upsert's value wins.
    assert_eq!(tender.state_text, "Adjudicada");
}

#[tokio::test]
async fn bulk_upsert_keeps_first_occurrence_per_code_within_batch() {
    let (_container, pool) = common::postgres_pool().await;
    let repo = Repository::new(pool);

    let mut first = sample_upsert("TENDER-3", "Municipalidad B", "Publicada");
    first.bidder_count = 1;
    let mut duplicate = sample_upsert("TENDER-3", "Municipalidad B", "Publicada");
    duplicate.bidder_count = 99;

    repo.bulk_upsert_tenders(&[first, duplicate]).await.unwrap();

    let candidates = repo.candidates_for_score_recompute().await.unwrap();
    assert_eq!(candidates.len(), 1);
}

#[tokio::test]
async fn mark_all_organisms_seen_clears_new_flag() {
    let (_container, pool) = common::postgres_pool().await;
    let repo = Repository::new(pool);

    repo.bulk_upsert_tenders(&[sample_upsert("TENDER-4", "Municipalidad C", "Publicada")])
        .await
        .unwrap();
    let before = repo.list_organisms().await.unwrap();
    assert!(before[0].is_new);

    repo.mark_all_organisms_seen().await.unwrap();

    let after = repo.list_organisms().await.unwrap();
    assert!(!after[0].is_new);
}

#[tokio::test]
async fn follow_state_invariants_hold_across_mutations() {
    let (_container, pool) = common::postgres_pool().await;
    let repo = Repository::new(pool);

    repo.bulk_upsert_tenders(&[sample_upsert("TENDER-5", "Municipalidad D", "Publicada")])
        .await
        .unwrap();
    let tender = repo.candidates_for_score_recompute().await.unwrap().remove(0);

    let favorite = repo.set_favorite(tender.id, true).await.unwrap();
    assert!(favorite.is_favorite);

    // Submitting a bid auto-enables favorite.
    let bidding = repo.set_bid_submitted(tender.id, true).await.unwrap();
    assert!(bidding.is_favorite);
    assert!(bidding.is_bid_submitted);

    // Hiding clears both favorite and bidding.
    let hidden = repo.set_hidden(tender.id, true).await.unwrap();
    assert!(!hidden.is_favorite);
    assert!(!hidden.is_bid_submitted);
    assert!(hidden.is_hidden);
}

#[tokio::test]
async fn close_expired_locally_only_touches_active_tenders() {
    let (_container, pool) = common::postgres_pool().await;
    let repo = Repository::new(pool);

    let mut expired = sample_upsert("TENDER-6", "Municipalidad E", "Publicada");
    expired.close_at = Utc::now() - Duration::days(1);
    let mut already_closed = sample_upsert("TENDER-7", "Municipalidad E", "Cerrada");
    already_closed.close_at = Utc::now() - Duration::days(1);

    repo.bulk_upsert_tenders(&[expired, already_closed]).await.unwrap();

    let count = repo.close_expired_locally().await.unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn sweep_old_records_exempts_favorites() {
    let (_container, pool) = common::postgres_pool().await;
    let repo = Repository::new(pool);

    let mut old_closed = sample_upsert("TENDER-8", "Municipalidad F", "Cerrada");
    old_closed.close_at = Utc::now() - Duration::days(60);
    let mut old_favorite = sample_upsert("TENDER-9", "Municipalidad F", "Cerrada");
    old_favorite.close_at = Utc::now() - Duration::days(60);

    repo.bulk_upsert_tenders(&[old_closed, old_favorite]).await.unwrap();

    let candidates = repo.candidates_for_score_recompute().await.unwrap();
    let favorite_tender = candidates.iter().find(|c| c.code == "TENDER-9").unwrap();
    repo.set_favorite(favorite_tender.id, true).await.unwrap();

    let deleted = repo.sweep_old_records(30).await.unwrap();
    assert_eq!(deleted, 1);

    let remaining = repo.candidates_for_score_recompute().await.unwrap();
    assert!(remaining.iter().any(|c| c.code == "TENDER-9"));
    assert!(!remaining.iter().any(|c| c.code == "TENDER-8"));
}

#[tokio::test]
async fn update_detail_writes_fields_and_conditionally_state() {
    let (_container, pool) = common::postgres_pool().await;
    let repo = Repository::new(pool);

    repo.bulk_upsert_tenders(&[sample_upsert("TENDER-10", "Municipalidad G", "Publicada")])
        .await
        .unwrap();

    let detail = DetailRecord {
        description: Some("Compra de equipos de oficina".to_string()),
        address: Some("Av. Siempre Viva 123".to_string()),
        lead_time_days: Some(15),
        second_call_close_at: None,
        products: Some(serde_json::json!([{"name": "Notebook", "description": "16GB"}])),
        state_text: None,
        state_tag: None,
    };
    repo.update_detail("TENDER-10", &detail, 42, &["trace entry".to_string()])
        .await
        .unwrap();

    let candidates = repo.candidates_for_score_recompute().await.unwrap();
    let tender = candidates.iter().find(|c| c.code == "TENDER-10").unwrap();
    assert_eq!(tender.description.as_deref(), Some("Compra de equipos de oficina"));
    assert_eq!(tender.score, 42);
    // state_text untouched since detail didn't provide one.
    assert_eq!(tender.state_text, "Publicada");
}

#[tokio::test]
async fn bulk_update_scores_chunks_large_batches() {
    let (_container, pool) = common::postgres_pool().await;
    let repo = Repository::new(pool);

    let items: Vec<TenderUpsert> = (0..3)
        .map(|i| sample_upsert(&format!("TENDER-BATCH-{i}"), "Municipalidad H", "Publicada"))
        .collect();
    repo.bulk_upsert_tenders(&items).await.unwrap();

    let candidates = repo.candidates_for_score_recompute().await.unwrap();
    let updates: Vec<_> = candidates
        .iter()
        .map(|c| qb_repo::ScoreUpdate {
            id: c.id,
            score: 77,
            trace: vec!["recomputed".to_string()],
        })
        .collect();

    let applied = repo.bulk_update_scores(&updates).await.unwrap();
    assert_eq!(applied, 3);

    let refreshed = repo.candidates_for_score_recompute().await.unwrap();
    assert!(refreshed.iter().all(|c| c.score == 77));
}
