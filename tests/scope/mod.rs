use crawldex::scope::{ScopeLevel, ScopeManager};
use uuid::Uuid;

#[test]
fn test_full_resolution_table() {
    use ScopeLevel::*;

    let cases: &[(Option<&str>, Option<&str>, Option<&str>, ScopeLevel)] = &[
        (None, None, None, Global),
        (None, None, Some("local"), Global),
        (None, None, Some("global"), Global),
        (None, Some("d"), None, Global),
        (Some("p"), None, None, Project),
        (Some("p"), None, Some("project"), Project),
        (Some("p"), None, Some("global"), Global),
        (Some("p"), Some("d"), None, Local),
        (Some("p"), Some("d"), Some("local"), Local),
        (Some("p"), Some("d"), Some("project"), Project),
        (Some("p"), Some("d"), Some("global"), Global),
    ];

    for (project, dataset, requested, expected) in cases {
        assert_eq!(
            ScopeManager::resolve_scope(*project, *dataset, *requested),
            *expected,
            "({:?}, {:?}, {:?})",
            project,
            dataset,
            requested
        );
    }
}

#[test]
fn test_collection_names_per_scope() {
    assert_eq!(
        ScopeManager::collection_name(Some("p"), Some("d"), ScopeLevel::Global),
        "global_knowledge"
    );
    assert_eq!(
        ScopeManager::collection_name(Some("Web Crawler"), None, ScopeLevel::Project),
        "project_web_crawler"
    );
    assert_eq!(
        ScopeManager::collection_name(
            Some("Web Crawler"),
            Some("API Docs v2.1"),
            ScopeLevel::Local
        ),
        "project_web_crawler_dataset_api_docs_v2_1"
    );
}

/// Collection names must survive the stores' identifier validation.
#[test]
fn test_sanitized_names_are_store_safe() {
    let hostile = ["a b!c", "UPPER-case", "dots.and.dashes-", "__x__"];
    for name in hostile {
        let collection =
            ScopeManager::collection_name(Some(name), Some(name), ScopeLevel::Local);
        assert!(
            collection
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
            "unsafe collection name: {}",
            collection
        );
    }
}

#[test]
fn test_ids_are_stable_across_runs() {
    let first = (
        ScopeManager::project_id(Some("alpha")),
        ScopeManager::dataset_id(Some("docs")),
    );
    let second = (
        ScopeManager::project_id(Some("alpha")),
        ScopeManager::dataset_id(Some("docs")),
    );
    assert_eq!(first, second);

    // v5 over the DNS namespace, not random
    assert_eq!(
        ScopeManager::project_id(Some("alpha")),
        Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"alpha")
    );
}
