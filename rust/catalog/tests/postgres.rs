mod support;

use http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;
use serial_test::serial;
use support::{column, with_postgres_harness};

const ELECTRONICS: &str = "11111111-1111-4111-8111-111111111111";
const CLOTHING: &str = "11111111-1111-4111-8111-222222222222";

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn filtered_products_match_seed() {
    with_postgres_harness(|harness| async move {
        let (status, body) = harness
            .get_json("/api/v1/products?price%5Bgte%5D=100&price%5Blte%5D=1000&sort=price")
            .await;

        assert_eq!(status, StatusCode::OK, "body: {body}");
        assert_eq!(
            column(&body, "title"),
            vec![json!("Budget Phone"), json!("Smart Phone X")]
        );
        assert!(body["data"][0].get("revision").is_none());
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn keyword_category_and_color_filters() {
    with_postgres_harness(|harness| async move {
        let (_, body) = harness
            .get_json("/api/v1/products?keyword=phone&sort=title")
            .await;
        assert_eq!(
            column(&body, "title"),
            vec![json!("Budget Phone"), json!("Phone Case"), json!("Smart Phone X")]
        );

        let (_, body) = harness
            .get_json(&format!("/api/v1/products?keyword=phone&category={CLOTHING}"))
            .await;
        assert_eq!(body["results"], json!(0));

        let (_, body) = harness.get_json("/api/v1/products?color=red,white").await;
        assert_eq!(body["results"], json!(3));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn pagination_and_sorting_in_sql() {
    with_postgres_harness(|harness| async move {
        let (_, body) = harness
            .get_json("/api/v1/products?sort=price&limit=2&page=2")
            .await;
        assert_eq!(body["paginationResult"]["numberOfPages"], json!(3));
        assert_eq!(
            column(&body, "title"),
            vec![json!("Linen Shirt"), json!("Budget Phone")]
        );

        let (_, body) = harness.get_json("/api/v1/products?sort=-sold,title").await;
        assert_eq!(body["data"][3]["title"], json!("Cotton Shirt"));
        assert_eq!(body["data"][4]["title"], json!("Linen Shirt"));
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn rankings_match_seed() {
    with_postgres_harness(|harness| async move {
        let (_, body) = harness.get_json("/api/v1/products/best-seller").await;
        assert_eq!(
            column(&body, "sold"),
            vec![json!(500), json!(300), json!(120), json!(75), json!(75), json!(40)]
        );

        let (_, body) = harness.get_json("/api/v1/products/sales").await;
        assert_eq!(
            column(&body, "title"),
            vec![
                json!("Ultrabook 14"),
                json!("Smart Phone X"),
                json!("Cotton Shirt"),
                json!("Phone Case"),
            ]
        );
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn records_and_nested_routes() {
    with_postgres_harness(|harness| async move {
        let (status, body) = harness
            .get_json("/api/v1/products/44444444-4444-4444-8444-000000000001")
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["data"]["imageCover"],
            json!("http://localhost:8000/products/phone-x.jpeg")
        );

        let (status, _) = harness
            .get_json("/api/v1/categories/11111111-1111-4111-8111-999999999999")
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = harness
            .get_json(&format!("/api/v1/categories/{ELECTRONICS}/subcategories"))
            .await;
        assert_eq!(
            column(&body, "name"),
            vec![json!("Laptops"), json!("Phones")]
        );
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn translate_includes_generated_sql() {
    with_postgres_harness(|harness| async move {
        let (status, body) = harness
            .get_json("/api/v1/translate/brands?keyword=acme")
            .await;
        assert_eq!(status, StatusCode::OK);
        let sql = body["sql"].as_str().expect("postgres store should render SQL");
        assert!(sql.contains("\"brands\".\"name\" ILIKE"), "sql: {sql}");
    })
    .await;
}
