//! News articles.

use super::{page_window, required_str, CatalogContext, Page};
use crate::caching::EntityType;
use crate::core::error::{ServiceError, ServiceResult};
use crate::store::{collections, Document, Filter, FindOptions, SortOrder};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Fields returned by listings
const SUMMARY_FIELDS: [&str; 8] = [
    "title",
    "slug",
    "summary",
    "category",
    "trending",
    "coverImage",
    "publishDate",
    "readTime",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewsQuery {
    pub category: Option<String>,
    /// Articles carrying any of these tags
    pub tags: Vec<String>,
    pub author_name: Option<String>,
    /// Matched against title and summary, ignoring case
    pub keyword: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl NewsQuery {
    fn keyword(&self) -> Option<String> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase)
    }

    fn tags(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).collect()
    }

    fn filter(&self) -> Filter {
        let mut filters = Vec::new();
        if let Some(category) = &self.category {
            filters.push(Filter::eq("category", category.as_str()));
        }
        let tags = self.tags();
        if !tags.is_empty() {
            filters.push(Filter::in_values("tags", tags));
        }
        if let Some(author) = &self.author_name {
            filters.push(Filter::eq("author.name", author.as_str()));
        }
        if let Some(keyword) = self.keyword() {
            filters.push(Filter::or(vec![
                Filter::contains("title", &keyword),
                Filter::contains("summary", &keyword),
            ]));
        }
        Filter::and(filters)
    }
}

#[derive(Clone)]
pub struct News {
    ctx: CatalogContext,
}

impl News {
    pub fn new(ctx: CatalogContext) -> Self {
        Self { ctx }
    }

    /// Publish an article; the slug must be unused
    pub async fn create(&self, doc: Document) -> ServiceResult<Document> {
        let slug = required_str(&doc, "slug")?;
        required_str(&doc, "title")?;
        self.ctx
            .ensure_keyable("slug", self.ctx.key("news").part("slug").part(&slug))?;

        let taken = self
            .ctx
            .store
            .count_documents(collections::NEWS, &Filter::eq("slug", slug.as_str()))
            .await?;
        if taken > 0 {
            return Err(ServiceError::validation("slug", format!("article '{}' already exists", slug)));
        }

        let mut doc = doc;
        if let Value::Object(map) = &mut doc {
            map.insert("slug".to_string(), Value::String(slug.clone()));
            map.entry("publishDate")
                .or_insert_with(|| Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)));
        }

        let created = self.ctx.store.insert(collections::NEWS, doc).await?;
        self.ctx.invalidate(EntityType::News, Some(&slug)).await;
        info!("Published article {}", slug);
        Ok(created)
    }

    /// Newest first
    pub async fn list(&self, query: &NewsQuery) -> ServiceResult<Page<Document>> {
        let (page, limit) = page_window(query.page, query.limit, 10);
        let key = self
            .ctx
            .key("news")
            .part("list")
            .param_opt("category", query.category.as_deref())
            .param_list("tags", &query.tags())
            .param_opt("author", query.author_name.as_deref())
            .param_opt("q", query.keyword())
            .param("page", page)
            .param("limit", limit)
            .build()?;

        self.ctx
            .cached(&key, self.ctx.ttl.listing, || async {
                let filter = query.filter();
                let options = FindOptions::new()
                    .sort_by("publishDate", SortOrder::Descending)
                    .sort_by("slug", SortOrder::Ascending)
                    .skip((page - 1) * limit)
                    .limit(limit)
                    .project(&SUMMARY_FIELDS);
                let total = self.ctx.store.count_documents(collections::NEWS, &filter).await?;
                let items = self.ctx.store.find(collections::NEWS, &filter, &options).await?;
                Ok::<_, ServiceError>(Page::new(items, total, page, limit))
            })
            .await
    }

    /// Full article
    pub async fn get(&self, slug: &str) -> ServiceResult<Document> {
        let key = self.ctx.key("news").part("slug").part(slug).build()?;
        self.ctx
            .cached(&key, self.ctx.ttl.detail, || async {
                self.ctx
                    .store
                    .find_one(collections::NEWS, &Filter::eq("slug", slug))
                    .await?
                    .ok_or_else(|| ServiceError::not_found("article", slug))
            })
            .await
    }

    /// Every article slug
    pub async fn slugs(&self) -> ServiceResult<Vec<String>> {
        let key = self.ctx.key("news").part("list").part("slugs").build()?;
        self.ctx
            .cached(&key, self.ctx.ttl.listing, || async {
                let options = FindOptions::new().sort_by("slug", SortOrder::Ascending).project(&["slug"]);
                let docs = self.ctx.store.find(collections::NEWS, &Filter::All, &options).await?;
                Ok::<_, ServiceError>(
                    docs.iter()
                        .filter_map(|d| d.get("slug").and_then(Value::as_str).map(str::to_string))
                        .collect(),
                )
            })
            .await
    }

    pub async fn delete(&self, slug: &str) -> ServiceResult<Document> {
        let removed = self
            .ctx
            .store
            .delete_one(collections::NEWS, &Filter::eq("slug", slug))
            .await?
            .ok_or_else(|| ServiceError::not_found("article", slug))?;
        self.ctx.invalidate(EntityType::News, Some(slug)).await;
        Ok(removed)
    }
}
