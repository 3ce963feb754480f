//! End-to-end resolution: recognize, extract, fetch the directory, match.
//!
//! The resolver owns no I/O of its own; recognition and the directory are
//! trait objects supplied by the caller. Recognition and top-level directory
//! failures propagate unchanged, while a single group's member fetch failing
//! only degrades that group to an empty list.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::extract::NameExtractor;
use crate::matching::{FuzzyMatcher, MatchResults};
use crate::ocr::Recognizer;
use crate::onebot::{fetch_all_group_members, Directory};
use crate::types::{CandidateName, GroupInfo, MatchedContact, RecognizedFragment};

/// Everything one resolution run produced. An empty `candidates` with empty
/// matches means no names were detected; non-empty `candidates` with empty
/// matches means nothing in the directory resembled them.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Resolution {
    pub fragments: Vec<RecognizedFragment>,
    pub candidates: Vec<CandidateName>,
    pub matches: MatchResults,
}

/// Drives the full pipeline against a recognition backend and a directory.
pub struct Resolver {
    recognizer: Arc<dyn Recognizer>,
    directory: Arc<dyn Directory>,
    extractor: NameExtractor,
    matcher: FuzzyMatcher,
}

impl Resolver {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        directory: Arc<dyn Directory>,
        extractor: NameExtractor,
        matcher: FuzzyMatcher,
    ) -> Self {
        Self {
            recognizer,
            directory,
            extractor,
            matcher,
        }
    }

    /// Runs recognition and extraction only.
    pub async fn recognize(&self, image: &[u8]) -> Result<(Vec<RecognizedFragment>, Vec<CandidateName>)> {
        let fragments = self.recognizer.recognize(image).await?;
        let candidates = self.extractor.extract(&fragments);
        Ok((fragments, candidates))
    }

    /// Runs the whole pipeline for one image.
    pub async fn resolve(&self, image: &[u8]) -> Result<Resolution> {
        let (fragments, candidates) = self.recognize(image).await?;
        info!(
            fragments = fragments.len(),
            candidates = candidates.len(),
            "extracted name candidates"
        );

        if candidates.is_empty() {
            return Ok(Resolution {
                fragments,
                candidates,
                matches: MatchResults::default(),
            });
        }

        let (friends, group_info, members_by_group) = self.fetch_directory().await?;
        let matches = self
            .matcher
            .match_all(&candidates, &friends, &members_by_group, &group_info);
        info!(total = matches.total_count, "directory matching finished");

        Ok(Resolution {
            fragments,
            candidates,
            matches,
        })
    }

    /// Looks one name up across the whole directory at the tightened
    /// tolerance, without recognition.
    pub async fn search(&self, name: &str) -> Result<Vec<MatchedContact>> {
        let (friends, group_info, members_by_group) = self.fetch_directory().await?;
        Ok(self
            .matcher
            .exact_search(name, &friends, &members_by_group, &group_info))
    }

    /// Friends and groups fetched concurrently, then all member lists
    /// gathered with per-group degradation.
    async fn fetch_directory(
        &self,
    ) -> Result<(
        Vec<crate::types::Contact>,
        HashMap<String, GroupInfo>,
        HashMap<String, Vec<crate::types::GroupMember>>,
    )> {
        let (friends, groups) = tokio::join!(
            self.directory.list_friends(),
            self.directory.list_groups()
        );
        let friends = friends?;
        let groups = groups?;

        let members_by_group = fetch_all_group_members(self.directory.as_ref(), &groups).await;
        let group_info: HashMap<String, GroupInfo> = groups
            .into_iter()
            .map(|group| (group.group_id.clone(), group))
            .collect();

        Ok((friends, group_info, members_by_group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnapError;
    use crate::extract::ExtractorConfig;
    use crate::matching::MatcherConfig;
    use crate::types::{Contact, GroupMember, GroupRole};
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        pub Rec {}

        #[async_trait]
        impl Recognizer for Rec {
            async fn recognize(&self, image: &[u8]) -> Result<Vec<RecognizedFragment>>;
        }
    }

    mock! {
        pub Dir {}

        #[async_trait]
        impl Directory for Dir {
            async fn list_friends(&self) -> Result<Vec<Contact>>;
            async fn list_groups(&self) -> Result<Vec<GroupInfo>>;
            async fn list_group_members(&self, group_id: &str) -> Result<Vec<GroupMember>>;
        }
    }

    fn resolver(recognizer: MockRec, directory: MockDir) -> Resolver {
        Resolver::new(
            Arc::new(recognizer),
            Arc::new(directory),
            NameExtractor::new(ExtractorConfig::default()).expect("default extractor"),
            FuzzyMatcher::new(MatcherConfig::default()),
        )
    }

    fn friend(user_id: &str, nickname: &str) -> Contact {
        Contact {
            user_id: user_id.to_string(),
            nickname: nickname.to_string(),
            remark: String::new(),
            avatar: String::new(),
        }
    }

    fn group(group_id: &str, name: &str) -> GroupInfo {
        GroupInfo {
            group_id: group_id.to_string(),
            group_name: name.to_string(),
            member_count: 1,
            max_member_count: 100,
        }
    }

    #[tokio::test]
    async fn test_resolve_end_to_end() {
        let mut recognizer = MockRec::new();
        recognizer
            .expect_recognize()
            .returning(|_| Ok(vec![RecognizedFragment::new("张三 李四", 0.9)]));

        let mut directory = MockDir::new();
        directory
            .expect_list_friends()
            .returning(|| Ok(vec![friend("1", "张三三")]));
        directory.expect_list_groups().returning(|| Ok(Vec::new()));

        let resolution = resolver(recognizer, directory)
            .resolve(b"png bytes")
            .await
            .expect("pipeline succeeds");

        assert_eq!(resolution.candidates.len(), 2);
        assert_eq!(resolution.matches.all.len(), 1);
        assert_eq!(resolution.matches.all[0].contact.user_id(), "1");
        assert!(resolution.matches.all[0].score >= 0.6);
    }

    #[tokio::test]
    async fn test_resolve_no_names_skips_directory() {
        let mut recognizer = MockRec::new();
        recognizer
            .expect_recognize()
            .returning(|_| Ok(vec![RecognizedFragment::new("2024-01-01 12:00", 0.9)]));

        // No directory expectations: fetching would panic the mock.
        let directory = MockDir::new();

        let resolution = resolver(recognizer, directory)
            .resolve(b"img")
            .await
            .expect("empty result is not an error");
        assert!(resolution.candidates.is_empty());
        assert_eq!(resolution.matches.total_count, 0);
    }

    #[tokio::test]
    async fn test_recognition_failure_propagates() {
        let mut recognizer = MockRec::new();
        recognizer
            .expect_recognize()
            .returning(|_| Err(SnapError::Recognition("backend down".to_string())));

        let result = resolver(recognizer, MockDir::new()).resolve(b"img").await;
        assert!(matches!(result, Err(SnapError::Recognition(_))));
    }

    #[tokio::test]
    async fn test_failing_group_degrades_to_empty() {
        let mut recognizer = MockRec::new();
        recognizer
            .expect_recognize()
            .returning(|_| Ok(vec![RecognizedFragment::new("张三", 0.9)]));

        let mut directory = MockDir::new();
        directory.expect_list_friends().returning(|| Ok(Vec::new()));
        directory
            .expect_list_groups()
            .returning(|| Ok(vec![group("good", "g"), group("broken", "b")]));
        directory
            .expect_list_group_members()
            .returning(|group_id: &str| {
                if group_id == "broken" {
                    Err(SnapError::Directory("fetch failed".to_string()))
                } else {
                    Ok(vec![GroupMember {
                        user_id: "9".to_string(),
                        nickname: "张三".to_string(),
                        card: String::new(),
                        role: GroupRole::Member,
                    }])
                }
            });

        let resolution = resolver(recognizer, directory)
            .resolve(b"img")
            .await
            .expect("partial failure tolerated");

        assert_eq!(resolution.matches.all.len(), 1);
        assert_eq!(
            resolution.matches.all[0].group_id.as_deref(),
            Some("good")
        );
    }

    #[tokio::test]
    async fn test_search_uses_directory_without_recognition() {
        // Recognizer without expectations: calling it would panic.
        let recognizer = MockRec::new();

        let mut directory = MockDir::new();
        directory
            .expect_list_friends()
            .returning(|| Ok(vec![friend("1", "wendy")]));
        directory.expect_list_groups().returning(|| Ok(Vec::new()));

        let matches = resolver(recognizer, directory)
            .search("wendy")
            .await
            .expect("search succeeds");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].contact.user_id(), "1");
    }
}
