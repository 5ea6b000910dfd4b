//! Remote bucket listing.
//!
//! [`list_remote`] turns the paginated [`ObjectStore::list_objects`] API into a lazy
//! stream of validated [`RemoteFile`] records.

use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{self, Stream, TryStreamExt};
use tracing::{debug, warn};

use crate::contract::{ListObjectsRequest, ObjectStore, ObjectSummary};
use crate::error::ListError;

/// A bucket object as seen when the plan was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub key: String,
    /// Entity tag with surrounding quotes removed.
    pub etag: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl TryFrom<ObjectSummary> for RemoteFile {
    type Error = ListError;

    fn try_from(object: ObjectSummary) -> Result<Self, Self::Error> {
        let Some(key) = object.key.clone() else {
            return Err(ListError::MissingField {
                field: "key",
                object: format!("{object:?}"),
            });
        };
        let Some(etag) = object.e_tag.as_deref() else {
            return Err(ListError::MissingField {
                field: "etag",
                object: format!("{object:?}"),
            });
        };
        Ok(RemoteFile {
            key,
            etag: etag.replace('"', ""),
            size: object.size.unwrap_or(0).max(0) as u64,
            last_modified: object.last_modified,
        })
    }
}

/// Lists every object under `prefix`, following continuation tokens until the backend
/// stops returning one.
///
/// Yielded keys are relative to `prefix`, matching the keys of a local scan. The object
/// named exactly `prefix` (a folder placeholder) is skipped.
pub fn list_remote<'a, S>(
    store: &'a S,
    bucket: &'a str,
    prefix: Option<&'a str>,
) -> impl Stream<Item = Result<RemoteFile, ListError>> + 'a
where
    S: ObjectStore + ?Sized,
{
    // `None` state means the last page has been fetched.
    let pages = stream::try_unfold(Some(None::<String>), move |cursor| async move {
        let Some(continuation_token) = cursor else {
            return Ok(None);
        };
        let page = store
            .list_objects(ListObjectsRequest {
                bucket: bucket.to_string(),
                prefix: prefix.map(str::to_string),
                continuation_token,
            })
            .await
            .map_err(ListError::Backend)?;
        debug!(
            bucket,
            objects = page.objects.len(),
            more = page.next_continuation_token.is_some(),
            "Fetched listing page"
        );
        let next = page.next_continuation_token.map(Some);
        Ok::<_, ListError>(Some((page.objects, next)))
    });

    pages
        .map_ok(|objects| stream::iter(objects.into_iter().map(RemoteFile::try_from)))
        .try_flatten()
        .try_filter_map(move |file| future::ready(Ok(relative_to(file, prefix))))
}

fn relative_to(mut file: RemoteFile, prefix: Option<&str>) -> Option<RemoteFile> {
    let Some(prefix) = prefix.filter(|p| !p.is_empty()) else {
        return Some(file);
    };
    match file.key.strip_prefix(prefix) {
        Some("") => {
            debug!(key = %file.key, "Skipping prefix placeholder object");
            None
        }
        Some(relative) => {
            file.key = relative.to_string();
            Some(file)
        }
        None => {
            warn!(key = %file.key, prefix, "Listed object is outside the prefix, ignoring it");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ListPage, MockObjectStore};

    fn object(key: &str, etag: &str) -> ObjectSummary {
        ObjectSummary {
            key: Some(key.to_string()),
            e_tag: Some(format!("\"{etag}\"")),
            size: Some(3),
            last_modified: None,
        }
    }

    #[tokio::test]
    async fn follows_continuation_tokens_across_pages() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .times(3)
            .returning(|req| {
                assert_eq!(req.bucket, "bucket");
                assert_eq!(req.prefix.as_deref(), Some("app/"));
                let page = match req.continuation_token.as_deref() {
                    None => ListPage {
                        objects: vec![object("app/a.js", "aa"), object("app/b.js", "bb")],
                        next_continuation_token: Some("t1".into()),
                    },
                    Some("t1") => ListPage {
                        objects: vec![],
                        next_continuation_token: Some("t2".into()),
                    },
                    Some("t2") => ListPage {
                        objects: vec![object("app/index.html", "cc")],
                        next_continuation_token: None,
                    },
                    Some(other) => panic!("unexpected token {other}"),
                };
                Ok(page)
            });

        let files: Vec<RemoteFile> = list_remote(&store, "bucket", Some("app/"))
            .try_collect()
            .await
            .unwrap();

        let keys: Vec<&str> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["a.js", "b.js", "index.html"]);
        assert_eq!(files[0].etag, "aa");
        assert_eq!(files[2].size, 3);
    }

    #[tokio::test]
    async fn missing_etag_is_fatal() {
        let mut store = MockObjectStore::new();
        store.expect_list_objects().returning(|_| {
            Ok(ListPage {
                objects: vec![ObjectSummary {
                    key: Some("broken".into()),
                    ..Default::default()
                }],
                next_continuation_token: None,
            })
        });

        let err = list_remote(&store, "bucket", None)
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();
        assert!(matches!(err, ListError::MissingField { field: "etag", .. }));
    }

    #[tokio::test]
    async fn backend_failure_propagates() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_objects()
            .returning(|_| Err("access denied".into()));

        let err = list_remote(&store, "bucket", None)
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("access denied"));
    }

    #[tokio::test]
    async fn missing_key_is_fatal() {
        let mut store = MockObjectStore::new();
        store.expect_list_objects().returning(|_| {
            Ok(ListPage {
                objects: vec![ObjectSummary {
                    e_tag: Some("\"abc\"".into()),
                    size: Some(1),
                    ..Default::default()
                }],
                next_continuation_token: None,
            })
        });

        let err = list_remote(&store, "bucket", None)
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();
        assert!(matches!(err, ListError::MissingField { field: "key", .. }));
    }

    #[tokio::test]
    async fn keys_outside_the_prefix_and_the_placeholder_are_dropped() {
        let mut store = MockObjectStore::new();
        store.expect_list_objects().returning(|_| {
            Ok(ListPage {
                objects: vec![
                    object("app/", "dir"),
                    object("app/nested/x.js", "xx"),
                    object("other.js", "oo"),
                ],
                next_continuation_token: None,
            })
        });

        let files: Vec<RemoteFile> = list_remote(&store, "bucket", Some("app/"))
            .try_collect()
            .await
            .unwrap();
        let keys: Vec<&str> = files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["nested/x.js"]);
    }
}
