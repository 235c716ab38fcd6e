//! Passthrough queries against a real Postgres only ever see the caller's
//! agency. Needs Docker: `cargo test -p agencyhub-infra -- --ignored`.

use std::sync::Arc;

use serde_json::json;
use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers_modules::postgres::Postgres;

use agencyhub_core::{AgencyId, RecordId};
use agencyhub_infra::schema::ensure_schema;
use agencyhub_infra::store::save_record;
use agencyhub_infra::{
    Collection, PostgresRecordStore, QueryError, QueryRequest, RecordStore, SqlProxy,
};

fn request(sql: &str) -> QueryRequest {
    QueryRequest { sql: sql.to_string(), params: vec![] }
}

#[tokio::test]
#[ignore = "starts a Postgres container"]
async fn passthrough_is_confined_to_the_calling_agency() -> anyhow::Result<()> {
    let postgres = Postgres::default().with_tag("16").start().await?;
    let url = format!(
        "postgresql://postgres:postgres@{}:{}/postgres",
        postgres.get_host().await?,
        postgres.get_host_port_ipv4(5432).await?
    );
    let pool = PgPool::connect(&url).await?;
    ensure_schema(&pool).await?;

    let store = PostgresRecordStore::new(pool.clone());
    let (acme, globex) = (AgencyId::new(), AgencyId::new());
    for agency in [acme, globex] {
        save_record(&store, agency, Collection::LEADS, RecordId::new(), &json!({"name": "lead"}), 0)
            .await?;
    }

    let proxy = SqlProxy::new(Arc::new(pool), 100, 5_000);

    let all = proxy.execute(acme, &request("SELECT agency_id::text AS agency FROM records")).await?;
    assert_eq!(all.row_count, 1);
    assert_eq!(all.rows[0]["agency"], json!(acme.to_string()));

    let foreign = QueryRequest {
        sql: "SELECT count(*) AS n FROM records WHERE agency_id = $1::uuid".to_string(),
        params: vec![json!(globex.to_string())],
    };
    assert_eq!(proxy.execute(acme, &foreign).await?.rows[0]["n"], json!(0));

    let deleted = proxy.execute(acme, &request("DELETE FROM records RETURNING record_id")).await?;
    assert_eq!(deleted.row_count, 1);
    assert_eq!(store_count(&store, globex).await?, 1);

    let smuggled = QueryRequest {
        sql: "INSERT INTO records (agency_id, collection, record_id, version, body) \
              VALUES ($1::uuid, 'leads', gen_random_uuid(), 1, '{}'::jsonb)"
            .to_string(),
        params: vec![json!(globex.to_string())],
    };
    assert!(matches!(proxy.execute(acme, &smuggled).await, Err(QueryError::Database(_))));
    assert_eq!(store_count(&store, globex).await?, 1);

    assert_eq!(
        proxy.execute(acme, &request("RESET ROLE")).await,
        Err(QueryError::SessionControl)
    );
    Ok(())
}

async fn store_count(store: &PostgresRecordStore, agency: AgencyId) -> anyhow::Result<u64> {
    Ok(store.count(agency, Collection::LEADS).await?)
}
