diesel::table! {
    use diesel::sql_types::*;

    categories (id) {
        id -> Uuid,
        name -> Text,
        slug -> Text,
        image -> Nullable<Text>,
        revision -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;

    subcategories (id) {
        id -> Uuid,
        name -> Text,
        slug -> Text,
        category_id -> Uuid,
        revision -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::sql_types::*;

    brands (id) {
        id -> Uuid,
        name -> Text,
        slug -> Text,
        image -> Nullable<Text>,
        revision -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    use diesel::pg::sql_types::Array;
    use diesel::sql_types::*;

    products (id) {
        id -> Uuid,
        title -> Text,
        slug -> Text,
        description -> Text,
        quantity -> Int4,
        sold -> Int4,
        price -> Float8,
        price_after_discount -> Nullable<Float8>,
        colors -> Array<Text>,
        image_cover -> Text,
        images -> Array<Text>,
        category_id -> Uuid,
        subcategory_ids -> Array<Uuid>,
        brand_id -> Nullable<Uuid>,
        ratings_average -> Nullable<Float8>,
        ratings_quantity -> Int4,
        revision -> Int4,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(categories, subcategories, brands, products);
