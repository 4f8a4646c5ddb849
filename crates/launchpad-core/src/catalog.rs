//! Grouping and filtering over a discovery result.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use crate::project::Project;

/// Projects sharing one directory, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectGroup<T> {
    pub path: PathBuf,
    pub items: Vec<T>,
}

/// Group items by project directory.
///
/// Groups appear in the order their first member was discovered.
pub fn group_by_path<T>(items: Vec<T>, project: impl Fn(&T) -> &Project) -> Vec<ProjectGroup<T>> {
    let mut groups: Vec<ProjectGroup<T>> = Vec::new();
    let mut index: HashMap<PathBuf, usize> = HashMap::new();

    for item in items {
        let path = project(&item).path.clone();
        if let Some(&i) = index.get(&path) {
            groups[i].items.push(item);
        } else {
            index.insert(path.clone(), groups.len());
            groups.push(ProjectGroup {
                path,
                items: vec![item],
            });
        }
    }

    groups
}

/// Sorted distinct categories across all projects.
pub fn categories<'a>(projects: impl IntoIterator<Item = &'a Project>) -> Vec<String> {
    projects
        .into_iter()
        .filter_map(|p| p.config.category.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Category selection applied to a project list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    /// Projects without a category.
    Uncategorized,
    Named(String),
}

impl CategoryFilter {
    pub fn matches(&self, project: &Project) -> bool {
        match self {
            Self::All => true,
            Self::Uncategorized => project.config.category.is_none(),
            Self::Named(name) => project.config.category.as_deref() == Some(name.as_str()),
        }
    }
}

impl From<Option<&str>> for CategoryFilter {
    fn from(value: Option<&str>) -> Self {
        match value {
            None => Self::All,
            Some("Uncategorized") => Self::Uncategorized,
            Some(name) => Self::Named(name.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectConfig;

    fn project(path: &str, name: &str, category: Option<&str>) -> Project {
        let mut config = ProjectConfig::named(name);
        config.category = category.map(str::to_string);
        Project::new(path, config)
    }

    #[test]
    fn groups_preserve_discovery_order() {
        let projects = vec![
            project("/b", "b1", None),
            project("/a", "a1", None),
            project("/b", "b2", None),
        ];

        let groups = group_by_path(projects, |p| p);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].path, PathBuf::from("/b"));
        let names: Vec<&str> = groups[0].items.iter().map(|p| p.config.name.as_str()).collect();
        assert_eq!(names, vec!["b1", "b2"]);
        assert_eq!(groups[1].items.len(), 1);
    }

    #[test]
    fn categories_are_sorted_and_distinct() {
        let projects = [
            project("/a", "1", Some("web")),
            project("/b", "2", None),
            project("/c", "3", Some("api")),
            project("/d", "4", Some("web")),
        ];
        assert_eq!(categories(&projects), vec!["api".to_string(), "web".to_string()]);
    }

    #[test]
    fn filter_matches_by_category() {
        let tagged = project("/a", "1", Some("web"));
        let plain = project("/b", "2", None);

        assert!(CategoryFilter::All.matches(&tagged));
        assert!(CategoryFilter::Uncategorized.matches(&plain));
        assert!(!CategoryFilter::Uncategorized.matches(&tagged));

        let web = CategoryFilter::from(Some("web"));
        assert!(web.matches(&tagged));
        assert!(!web.matches(&plain));
        assert_eq!(CategoryFilter::from(Some("Uncategorized")), CategoryFilter::Uncategorized);
    }
}
