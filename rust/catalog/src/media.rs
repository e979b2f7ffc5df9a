//! Rewrites stored image references into absolute URLs under the configured
//! public base. Stores call [`MediaUrls::resolve`] on every record they load.

use crate::params::Entity;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUrls {
    base_url: String,
}

impl MediaUrls {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn resolve(&self, entity: Entity, document: &mut Value) {
        let Value::Object(fields) = document else {
            return;
        };

        match entity {
            Entity::Categories | Entity::Brands => {
                if let Some(Value::String(image)) = fields.get_mut("image") {
                    *image = self.resolve_one(entity, image);
                }
            }
            Entity::Products => {
                if let Some(Value::String(cover)) = fields.get_mut("imageCover") {
                    *cover = self.resolve_one(entity, cover);
                }
                if let Some(Value::Array(images)) = fields.get_mut("images") {
                    for image in images.iter_mut() {
                        if let Value::String(image) = image {
                            *image = self.resolve_one(entity, image);
                        }
                    }
                }
            }
            Entity::SubCategories => {}
        }
    }

    fn resolve_one(&self, entity: Entity, raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }

        let collection = entity.collection();
        if !is_absolute(raw) {
            return format!("{}/{collection}/{raw}", self.base_url);
        }

        let remainder = markers(entity)
            .iter()
            .filter_map(|marker| {
                raw.rfind(marker.as_str())
                    .map(|index| (index, &raw[index + marker.len()..]))
            })
            .max_by_key(|(index, _)| *index)
            .map(|(_, remainder)| remainder);

        match remainder {
            Some(inner) if inner.starts_with("http") => inner.to_string(),
            Some(filename) => format!("{}/{collection}/{filename}", self.base_url),
            None => raw.to_string(),
        }
    }
}

fn is_absolute(raw: &str) -> bool {
    raw.starts_with("http://") || raw.starts_with("https://")
}

/// Path segments that identify one of our own upload URLs.
fn markers(entity: Entity) -> Vec<String> {
    let mut markers = vec![format!("/{}/", entity.collection())];
    if entity == Entity::Brands {
        markers.push(format!("/{}/", Entity::Categories.collection()));
    }
    markers
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn media() -> MediaUrls {
        MediaUrls::new("https://shop.example.com/")
    }

    fn brand_image(raw: &str) -> Value {
        let mut doc = json!({ "name": "Acme", "image": raw });
        media().resolve(Entity::Brands, &mut doc);
        doc["image"].clone()
    }

    #[test]
    fn bare_filenames_are_prefixed() {
        assert_eq!(
            brand_image("brand-1.jpeg"),
            json!("https://shop.example.com/brands/brand-1.jpeg")
        );
    }

    #[test]
    fn own_urls_are_rerooted_on_base() {
        assert_eq!(
            brand_image("http://localhost:8000/brands/brand-1.jpeg"),
            json!("https://shop.example.com/brands/brand-1.jpeg")
        );
        assert_eq!(
            brand_image("http://localhost:8000/categories/old.png"),
            json!("https://shop.example.com/brands/old.png")
        );
    }

    #[test]
    fn embedded_external_urls_are_unwrapped() {
        assert_eq!(
            brand_image("http://localhost:8000/brands/https://cdn.example.net/a.png"),
            json!("https://cdn.example.net/a.png")
        );
    }

    #[test]
    fn foreign_urls_are_untouched() {
        assert_eq!(
            brand_image("https://cdn.example.net/logos/a.png"),
            json!("https://cdn.example.net/logos/a.png")
        );
    }

    #[test]
    fn categories_do_not_accept_brand_urls() {
        let mut doc = json!({ "image": "http://old.host/brands/x.png" });
        media().resolve(Entity::Categories, &mut doc);
        assert_eq!(doc["image"], json!("http://old.host/brands/x.png"));
    }

    #[test]
    fn products_resolve_cover_and_gallery() {
        let mut doc = json!({
            "imageCover": "cover.jpeg",
            "images": ["one.jpeg", "https://cdn.example.net/two.jpeg"],
        });
        media().resolve(Entity::Products, &mut doc);

        assert_eq!(
            doc,
            json!({
                "imageCover": "https://shop.example.com/products/cover.jpeg",
                "images": [
                    "https://shop.example.com/products/one.jpeg",
                    "https://cdn.example.net/two.jpeg"
                ],
            })
        );
    }

    #[test]
    fn missing_or_null_images_are_left_alone() {
        let mut doc = json!({ "name": "Phones", "image": null });
        media().resolve(Entity::Categories, &mut doc);
        assert_eq!(doc, json!({ "name": "Phones", "image": null }));
    }
}
