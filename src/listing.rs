use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::rdf::{BookMetadata, MetadataMap};

/// A book list entry: the metadata record with its id alongside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookListing {
    pub id: u64,
    #[serde(flatten)]
    pub metadata: BookMetadata,
}

fn matches(subject: &str, filter: Option<&str>) -> bool {
    match filter {
        Some(f) => subject.to_lowercase().contains(f),
        None => true,
    }
}

/// Distinct subjects containing `filter` (case-insensitive), sorted.
pub fn list_subjects(metadata: &MetadataMap, filter: Option<&str>) -> Vec<String> {
    let filter = filter.map(str::to_lowercase);
    metadata
        .values()
        .flat_map(|book| book.subjects.iter())
        .filter(|s| matches(s, filter.as_deref()))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Books with at least one subject containing `filter`, once each, by
/// ascending id.
pub fn list_books(metadata: &MetadataMap, filter: Option<&str>) -> Vec<BookListing> {
    let filter = filter.map(str::to_lowercase);
    metadata
        .iter()
        .filter(|(_, book)| book.subjects.iter().any(|s| matches(s, filter.as_deref())))
        .map(|(&id, book)| BookListing {
            id,
            metadata: book.clone(),
        })
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn book(subjects: &[&str]) -> BookMetadata {
        BookMetadata {
            publisher: "Project Gutenberg".into(),
            license: "license".into(),
            issued_date: "2008-06-27".into(),
            rights: "Public domain in the USA.".into(),
            downloads: 0,
            authors: Vec::new(),
            editors: Vec::new(),
            title: Some("Title".into()),
            language: "en".into(),
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            bookshelf: None,
            epub_noimages_link: None,
            txt_link: None,
        }
    }

    fn metadata() -> MetadataMap {
        MetadataMap::from([
            (84, book(&["Science fiction", "Horror tales"])),
            (11, book(&["Fantasy fiction", "Children's stories"])),
            (2, book(&["United States -- History"])),
            (12, book(&["Fantasy fiction"])),
        ])
    }

    #[test]
    fn subjects_distinct_and_sorted() {
        assert_eq!(
            list_subjects(&metadata(), None),
            vec![
                "Children's stories",
                "Fantasy fiction",
                "Horror tales",
                "Science fiction",
                "United States -- History",
            ]
        );
    }

    #[test]
    fn subject_filter_is_case_insensitive() {
        assert_eq!(
            list_subjects(&metadata(), Some("FICTION")),
            vec!["Fantasy fiction", "Science fiction"]
        );
        assert!(list_subjects(&metadata(), Some("poetry")).is_empty());
    }

    #[test]
    fn books_listed_once_by_id() {
        // 84 matches through both of its subjects
        let books = list_books(&metadata(), Some("t"));
        let ids: Vec<u64> = books.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![2, 11, 12, 84]);

        let fiction: Vec<u64> = list_books(&metadata(), Some("Fiction")).iter().map(|b| b.id).collect();
        assert_eq!(fiction, vec![11, 12, 84]);
    }

    #[test]
    fn book_listing_carries_id_beside_metadata() {
        let books = list_books(&metadata(), Some("history"));
        let json = serde_json::to_value(&books).unwrap();
        assert_eq!(json[0]["id"], 2);
        assert_eq!(json[0]["title"], "Title");
        assert_eq!(json[0]["subjects"][0], "United States -- History");
    }
}
