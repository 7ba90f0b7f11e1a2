//! Category model
//!
//! Categories form a forest. Each row stores its `parent_id` plus a modified
//! preorder traversal numbering (`lft`, `rght`, `tree_id`, `level`) so that
//! ancestors and descendants can be read with a single range query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Category entity, a node of the category tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    /// Unique identifier
    pub id: i64,
    /// Category title
    pub title: String,
    /// URL-friendly slug, unique across all categories
    pub slug: String,
    /// Free-form description, may be empty
    pub description: String,
    /// Parent category ID
    pub parent_id: Option<i64>,
    /// Preorder left bound
    pub lft: i32,
    /// Preorder right bound
    pub rght: i32,
    /// Which root tree this node belongs to
    pub tree_id: i32,
    /// Depth, 0 for roots
    pub level: i32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Category {
    /// Create a new unsaved category.
    ///
    /// The ID and tree numbering are assigned by the database layer.
    pub fn new(title: String, slug: String, description: String, parent_id: Option<i64>) -> Self {
        Self {
            id: 0,
            title,
            slug,
            description,
            parent_id,
            lft: 0,
            rght: 0,
            tree_id: 0,
            level: 0,
            created_at: Utc::now(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.rght == self.lft + 1
    }

    /// Number of categories below this one in its tree
    pub fn descendant_count(&self) -> i32 {
        ((self.rght - self.lft - 1) / 2).max(0)
    }

    /// True when `other` sits strictly below this node
    pub fn is_ancestor_of(&self, other: &Category) -> bool {
        self.tree_id == other.tree_id && self.lft < other.lft && self.rght > other.rght
    }

    /// Slash-joined path of ancestor slugs followed by this category's slug.
    ///
    /// `ancestors` must be ordered from the root down, as returned by the
    /// repository.
    pub fn tree_path(&self, ancestors: &[Category]) -> String {
        ancestors
            .iter()
            .map(|c| c.slug.as_str())
            .chain(std::iter::once(self.slug.as_str()))
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.title)
    }
}

/// Public URL of a category page given its tree path
pub fn category_url(tree_path: &str) -> String {
    format!("/categories/{}/", tree_path)
}

/// Preorder numbering of one category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreePosition {
    pub id: i64,
    pub lft: i32,
    pub rght: i32,
    pub tree_id: i32,
    pub level: i32,
}

/// Compute the preorder numbering of a set of categories from their parent links.
///
/// Roots are numbered as separate trees, ordered by title; siblings are
/// ordered by title too. A category whose parent is missing from the set is
/// treated as a root. Categories caught in a parent cycle are numbered as
/// roots of their own trees so every input gets a position.
pub fn number_tree(categories: &[Category]) -> Vec<TreePosition> {
    let ids: HashSet<i64> = categories.iter().map(|c| c.id).collect();
    let mut children: HashMap<Option<i64>, Vec<&Category>> = HashMap::new();
    for category in categories {
        let parent = category.parent_id.filter(|p| ids.contains(p) && *p != category.id);
        children.entry(parent).or_default().push(category);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
    }

    fn walk(
        node: &Category,
        level: i32,
        tree_id: i32,
        counter: &mut i32,
        children: &HashMap<Option<i64>, Vec<&Category>>,
        visited: &mut HashSet<i64>,
        out: &mut Vec<TreePosition>,
    ) {
        visited.insert(node.id);
        let lft = *counter;
        *counter += 1;
        let slot = out.len();
        out.push(TreePosition {
            id: node.id,
            lft,
            rght: 0,
            tree_id,
            level,
        });
        if let Some(kids) = children.get(&Some(node.id)) {
            for kid in kids {
                if !visited.contains(&kid.id) {
                    walk(kid, level + 1, tree_id, counter, children, visited, out);
                }
            }
        }
        out[slot].rght = *counter;
        *counter += 1;
    }

    let mut out = Vec::with_capacity(categories.len());
    let mut visited = HashSet::new();
    let mut tree_id = 0;

    let roots = children.get(&None).cloned().unwrap_or_default();
    for root in roots {
        tree_id += 1;
        let mut counter = 1;
        walk(root, 0, tree_id, &mut counter, &children, &mut visited, &mut out);
    }

    let mut stranded: Vec<&Category> = categories
        .iter()
        .filter(|c| !visited.contains(&c.id))
        .collect();
    stranded.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
    for node in stranded {
        if visited.contains(&node.id) {
            continue;
        }
        tree_id += 1;
        let mut counter = 1;
        walk(node, 0, tree_id, &mut counter, &children, &mut visited, &mut out);
    }

    out
}

/// One option of a tree-shaped select box
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TreeChoice {
    pub id: i64,
    pub label: String,
    pub level: i32,
}

/// Indentation marker prepended once per level in tree choice labels
pub const LEVEL_INDICATOR: &str = "|--";

impl TreeChoice {
    pub fn from_category(category: &Category) -> Self {
        let label = if category.level > 0 {
            format!(
                "{} {}",
                LEVEL_INDICATOR.repeat(category.level as usize),
                category.title
            )
        } else {
            category.title.clone()
        };
        Self {
            id: category.id,
            label,
            level: category.level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(id: i64, title: &str, parent_id: Option<i64>) -> Category {
        let mut category = Category::new(
            title.to_string(),
            title.to_lowercase(),
            String::new(),
            parent_id,
        );
        category.id = id;
        category
    }

    fn numbered(mut categories: Vec<Category>) -> Vec<Category> {
        let positions = number_tree(&categories);
        for category in categories.iter_mut() {
            let pos = positions.iter().find(|p| p.id == category.id).unwrap();
            category.lft = pos.lft;
            category.rght = pos.rght;
            category.tree_id = pos.tree_id;
            category.level = pos.level;
        }
        categories.sort_by_key(|c| (c.tree_id, c.lft));
        categories
    }

    #[test]
    fn test_category_new() {
        let category = Category::new(
            "Rust".to_string(),
            "rust".to_string(),
            "Systems programming".to_string(),
            None,
        );

        assert_eq!(category.id, 0);
        assert_eq!(category.title, "Rust");
        assert_eq!(category.parent_id, None);
        assert_eq!(category.to_string(), "Rust");
    }

    #[test]
    fn test_tree_path_without_parent_is_slug() {
        let root = cat(1, "Root", None);
        assert_eq!(root.tree_path(&[]), "root");
    }

    #[test]
    fn test_tree_path_joins_ancestor_slugs() {
        let a = cat(1, "A", None);
        let b = cat(2, "B", Some(1));
        let c = cat(3, "C", Some(2));
        assert_eq!(c.tree_path(&[a, b]), "a/b/c");
        assert_eq!(category_url("a/b/c"), "/categories/a/b/c/");
    }

    #[test]
    fn test_number_tree_orders_by_title() {
        let categories = numbered(vec![
            cat(1, "Zeta", None),
            cat(2, "Alpha", None),
            cat(3, "Mid", Some(2)),
            cat(4, "Beta", Some(2)),
        ]);

        let order: Vec<&str> = categories.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(order, vec!["Alpha", "Beta", "Mid", "Zeta"]);

        let alpha = &categories[0];
        assert_eq!((alpha.lft, alpha.rght, alpha.tree_id, alpha.level), (1, 6, 1, 0));
        let beta = &categories[1];
        assert_eq!((beta.lft, beta.rght, beta.level), (2, 3, 1));
        let zeta = &categories[3];
        assert_eq!((zeta.lft, zeta.rght, zeta.tree_id), (1, 2, 2));
    }

    #[test]
    fn test_number_tree_handles_cycles() {
        let positions = number_tree(&[cat(1, "A", Some(2)), cat(2, "B", Some(1))]);
        assert_eq!(positions.len(), 2);
        assert!(positions.iter().all(|p| p.rght > p.lft));
    }

    #[test]
    fn test_number_tree_treats_self_parent_as_root() {
        let positions = number_tree(&[cat(1, "A", Some(1))]);
        assert_eq!(positions[0].level, 0);
        assert_eq!((positions[0].lft, positions[0].rght), (1, 2));
    }

    #[test]
    fn test_ancestry_and_counts() {
        let categories = numbered(vec![
            cat(1, "A", None),
            cat(2, "B", Some(1)),
            cat(3, "C", Some(2)),
            cat(4, "D", None),
        ]);
        let (a, b, c, d) = (&categories[0], &categories[1], &categories[2], &categories[3]);

        assert!(a.is_ancestor_of(c));
        assert!(b.is_ancestor_of(c));
        assert!(!c.is_ancestor_of(a));
        assert!(!a.is_ancestor_of(d));
        assert!(!a.is_ancestor_of(a));
        assert_eq!(a.descendant_count(), 2);
        assert!(c.is_leaf());
        assert!(!b.is_leaf());
    }

    #[test]
    fn test_tree_choice_labels() {
        let categories = numbered(vec![cat(1, "Root", None), cat(2, "Leaf", Some(1))]);
        let choices: Vec<TreeChoice> = categories.iter().map(TreeChoice::from_category).collect();
        assert_eq!(choices[0].label, "Root");
        assert_eq!(choices[1].label, "|-- Leaf");

        let mut deep = cat(3, "Deep", Some(2));
        deep.level = 3;
        assert_eq!(TreeChoice::from_category(&deep).label, "|--|--|-- Deep");
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    /// Random forest: node i may only point at a parent with a smaller index.
    fn forest_strategy() -> impl Strategy<Value = Vec<Category>> {
        prop::collection::vec((any::<bool>(), any::<prop::sample::Index>(), "[a-z]{1,6}"), 1..25)
            .prop_map(|specs| {
                specs
                    .into_iter()
                    .enumerate()
                    .map(|(i, (has_parent, pick, title))| {
                        let parent_id = if has_parent && i > 0 {
                            Some(pick.index(i) as i64 + 1)
                        } else {
                            None
                        };
                        let mut c = Category::new(title, format!("s{}", i), String::new(), parent_id);
                        c.id = i as i64 + 1;
                        c
                    })
                    .collect()
            })
    }

    proptest! {
        /// Nested sets: each node's interval contains exactly its descendants.
        #[test]
        fn numbering_is_nested(categories in forest_strategy()) {
            let positions = number_tree(&categories);
            prop_assert_eq!(positions.len(), categories.len());

            let by_id: HashMap<i64, TreePosition> =
                positions.iter().map(|p| (p.id, *p)).collect();

            for category in &categories {
                let pos = by_id[&category.id];
                prop_assert!(pos.rght > pos.lft);
                if let Some(parent_id) = category.parent_id {
                    let parent = by_id[&parent_id];
                    prop_assert_eq!(parent.tree_id, pos.tree_id);
                    prop_assert!(parent.lft < pos.lft && parent.rght > pos.rght);
                    prop_assert_eq!(parent.level + 1, pos.level);
                } else {
                    prop_assert_eq!(pos.level, 0);
                    prop_assert_eq!(pos.lft, 1);
                }
            }
        }
    }
}
