//! Category service
//!
//! Business logic for the category tree:
//! - admin form cleaning (required title, slug prepopulated from the title
//!   and unique, parent that is neither the category nor one of its
//!   descendants)
//! - tree paths and public URLs
//! - public listing with published entry counts

use crate::db::repositories::{CategoryFilter, CategoryRepository, EntryFilter, EntryRepository};
use crate::models::{category_url, Category, TreeChoice};
use crate::services::forms::{FormData, FormErrors};
use anyhow::Context;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Error code and message when a category is chosen as its own parent
pub const SELF_PARENTING: (&str, &str) = ("self_parenting", "A category cannot be parent of itself.");

/// Error code and message when a category is moved below one of its descendants
pub const INVALID_MOVE: (&str, &str) = (
    "invalid_move",
    "A node may not be made a child of any of its descendants.",
);

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    /// Category not found
    #[error("Category not found: {0}")]
    NotFound(String),

    /// The submitted form did not validate
    #[error("Invalid category: {0}")]
    Invalid(FormErrors),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Fields of the category admin form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryForm {
    pub title: String,
    pub parent: String,
    pub description: String,
    pub slug: String,
}

impl CategoryForm {
    pub fn from_data(data: &FormData) -> Self {
        Self {
            title: data.text("title"),
            parent: data.text("parent"),
            description: data.text("description"),
            slug: data.text("slug"),
        }
    }

    /// Initial values when editing an existing category
    pub fn from_category(category: &Category) -> Self {
        Self {
            title: category.title.clone(),
            parent: category.parent_id.map(|id| id.to_string()).unwrap_or_default(),
            description: category.description.clone(),
            slug: category.slug.clone(),
        }
    }
}

/// A category with what the public list and the admin list display
#[derive(Debug, Clone, Serialize)]
pub struct CategoryListItem {
    #[serde(flatten)]
    pub category: Category,
    pub tree_path: String,
    pub url: String,
    pub entry_count: i64,
}

/// Category service for managing the category tree
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    entries: Arc<dyn EntryRepository>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, entries: Arc<dyn EntryRepository>) -> Self {
        Self { repo, entries }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Category>, CategoryServiceError> {
        Ok(self.repo.get_by_id(id).await.context("Failed to get category by ID")?)
    }

    /// Resolve a `/categories/{path}/` URL by its last non-empty segment
    pub async fn get_by_tree_path(&self, path: &str) -> Result<Category, CategoryServiceError> {
        let slug = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .last()
            .ok_or_else(|| CategoryServiceError::NotFound(path.to_string()))?;

        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category by slug")?
            .ok_or_else(|| CategoryServiceError::NotFound(path.to_string()))
    }

    /// Ancestor slugs, root first, followed by the category's own slug
    pub async fn tree_path(&self, category: &Category) -> Result<String, CategoryServiceError> {
        let ancestors = self
            .repo
            .get_ancestors(category)
            .await
            .context("Failed to get category ancestors")?;
        Ok(category.tree_path(&ancestors))
    }

    pub async fn absolute_url(&self, category: &Category) -> Result<String, CategoryServiceError> {
        Ok(category_url(&self.tree_path(category).await?))
    }

    /// Every category in tree order, with the number of entries `filter` sees in it
    pub async fn list_with_counts(
        &self,
        filter: &EntryFilter,
    ) -> Result<Vec<CategoryListItem>, CategoryServiceError> {
        let categories = self.repo.list().await.context("Failed to list categories")?;
        let counts = self
            .entries
            .count_by_category(filter)
            .await
            .context("Failed to count entries per category")?;
        Ok(list_items(&categories, &categories, &counts))
    }

    /// Admin changelist: matching categories with their tree paths
    pub async fn search(
        &self,
        filter: &CategoryFilter,
    ) -> Result<Vec<CategoryListItem>, CategoryServiceError> {
        let all = self.repo.list().await.context("Failed to list categories")?;
        let matching = self.repo.search(filter).await.context("Failed to search categories")?;
        let counts = self
            .entries
            .count_by_category(&EntryFilter::default())
            .await
            .context("Failed to count entries per category")?;
        Ok(list_items(&matching, &all, &counts))
    }

    /// Options of the parent select box, in tree order
    pub async fn parent_choices(&self) -> Result<Vec<TreeChoice>, CategoryServiceError> {
        let categories = self.repo.list().await.context("Failed to list categories")?;
        Ok(categories.iter().map(TreeChoice::from_category).collect())
    }

    /// Validate a submitted form against the current tree.
    ///
    /// `instance` is the category being edited, `None` when adding one.
    pub async fn clean(
        &self,
        form: &CategoryForm,
        instance: Option<&Category>,
    ) -> Result<Category, CategoryServiceError> {
        let mut errors = FormErrors::new();

        let title = form.title.trim().to_string();
        if title.is_empty() {
            errors.required("title");
        } else if title.chars().count() > 255 {
            errors.add("title", "max_length", "Ensure this value has at most 255 characters.");
        }

        let slug = if form.slug.trim().is_empty() {
            generate_slug(&title)
        } else {
            form.slug.trim().to_string()
        };
        if slug.is_empty() {
            if !title.is_empty() {
                errors.required("slug");
            }
        } else if !is_valid_slug(&slug) {
            errors.add(
                "slug",
                "invalid",
                "Enter a valid slug consisting of letters, numbers, underscores or hyphens.",
            );
        } else if self
            .repo
            .exists_by_slug(&slug, instance.map(|c| c.id))
            .await
            .context("Failed to check slug uniqueness")?
        {
            errors.add("slug", "unique", "Category with this Slug already exists.");
        }

        let mut parent_id = None;
        let requested_parent = match form.parent.trim() {
            "" => None,
            // ids are positive, so 0 reports an unparsable choice as unknown
            raw => raw.parse::<i64>().ok().or(Some(0)),
        };
        if let Some(id) = requested_parent {
            match self.repo.get_by_id(id).await.context("Failed to get parent category")? {
                None => errors.add(
                    "parent",
                    "invalid_choice",
                    "Select a valid choice. That choice is not one of the available choices.",
                ),
                Some(parent) => {
                    if let Some(current) = instance {
                        if parent.id == current.id {
                            errors.add("parent", SELF_PARENTING.0, SELF_PARENTING.1);
                        } else if current.is_ancestor_of(&parent) {
                            errors.add("parent", INVALID_MOVE.0, INVALID_MOVE.1);
                        }
                    }
                    parent_id = Some(parent.id);
                }
            }
        }

        if !errors.is_empty() {
            return Err(CategoryServiceError::Invalid(errors));
        }

        let mut category = match instance {
            Some(existing) => existing.clone(),
            None => Category::new(String::new(), String::new(), String::new(), None),
        };
        category.title = title;
        category.slug = slug;
        category.description = form.description.trim().to_string();
        category.parent_id = parent_id;
        Ok(category)
    }

    pub async fn create(&self, form: &CategoryForm) -> Result<Category, CategoryServiceError> {
        let category = self.clean(form, None).await?;
        let created = self.repo.create(&category).await.context("Failed to create category")?;
        tracing::info!("Created category '{}' ({})", created.title, created.id);
        Ok(created)
    }

    pub async fn update(&self, id: i64, form: &CategoryForm) -> Result<Category, CategoryServiceError> {
        let existing = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))?;
        let category = self.clean(form, Some(&existing)).await?;
        let updated = self.repo.update(&category).await.context("Failed to update category")?;
        tracing::info!("Updated category '{}' ({})", updated.title, updated.id);
        Ok(updated)
    }

    /// Delete a category; its children become roots
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        if self.get_by_id(id).await?.is_none() {
            return Err(CategoryServiceError::NotFound(id.to_string()));
        }
        self.repo.delete(id).await.context("Failed to delete category")?;
        tracing::info!("Deleted category {}", id);
        Ok(())
    }
}

/// Tree paths of `categories`, resolved against the full list `all`
pub fn tree_paths(all: &[Category]) -> HashMap<i64, String> {
    let by_id: HashMap<i64, &Category> = all.iter().map(|c| (c.id, c)).collect();
    let mut paths = HashMap::with_capacity(all.len());

    for category in all {
        let mut slugs = vec![category.slug.as_str()];
        let mut seen = vec![category.id];
        let mut parent = category.parent_id;
        while let Some(parent_id) = parent {
            let Some(node) = by_id.get(&parent_id) else { break };
            if seen.contains(&node.id) {
                break;
            }
            seen.push(node.id);
            slugs.push(node.slug.as_str());
            parent = node.parent_id;
        }
        slugs.reverse();
        paths.insert(category.id, slugs.join("/"));
    }
    paths
}

fn list_items(
    categories: &[Category],
    all: &[Category],
    counts: &HashMap<i64, i64>,
) -> Vec<CategoryListItem> {
    let paths = tree_paths(all);
    categories
        .iter()
        .map(|category| {
            let tree_path = paths
                .get(&category.id)
                .cloned()
                .unwrap_or_else(|| category.slug.clone());
            CategoryListItem {
                url: category_url(&tree_path),
                tree_path,
                entry_count: counts.get(&category.id).copied().unwrap_or(0),
                category: category.clone(),
            }
        })
        .collect()
}

/// Letters, digits, underscores and hyphens only
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

/// Generate a URL-friendly slug from a title.
///
/// Lowercases ASCII, keeps non-ASCII letters, turns everything else into
/// single hyphens.
pub fn generate_slug(title: &str) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || (!c.is_ascii() && c.is_alphanumeric()) {
                c
            } else if c == '_' {
                '_'
            } else {
                '-'
            }
        })
        .collect();

    let mut result = String::new();
    let mut prev_hyphen = false;
    for c in slug.chars() {
        if c == '-' {
            if !prev_hyphen && !result.is_empty() {
                result.push(c);
                prev_hyphen = true;
            }
        } else {
            result.push(c);
            prev_hyphen = false;
        }
    }

    result.trim_end_matches('-').to_string()
}
