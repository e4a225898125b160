//! Collaborative workspace - the shared question, language and code buffer
//!
//! Each session owns exactly one [`Workspace`]. Every participant may propose
//! edits; an edit is accepted only against the current revision, and each
//! accepted edit advances the revision by exactly one. There is no text merge:
//! a rejected writer sees [`SessionError::StaleRevision`] and must re-fetch.

pub mod catalog;

pub use catalog::{Language, Question};

use crate::error::{Result, SessionError};
use crate::session::Identity;
use serde::{Deserialize, Serialize};

/// Snapshot of the shared workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceState {
    pub question_id: String,
    pub language: Language,
    pub code: String,
    pub revision: u64,
    /// Author of the edit that produced this revision
    pub updated_by: Option<Identity>,
}

/// A single-field mutation of the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkspaceEdit {
    /// Select a question; resets the code to its starter text
    Question(String),
    /// Select a language; resets the code to the question's starter text
    Language(Language),
    /// Replace the code buffer
    Code(String),
}

/// Authoritative workspace of one session
#[derive(Debug)]
pub struct Workspace {
    state: WorkspaceState,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        let question = catalog::default_question();
        let language = Language::JavaScript;
        Self {
            state: WorkspaceState {
                question_id: question.id.to_string(),
                language,
                code: question.starter_code(language).to_string(),
                revision: 0,
                updated_by: None,
            },
        }
    }

    pub fn snapshot(&self) -> WorkspaceState {
        self.state.clone()
    }

    pub fn revision(&self) -> u64 {
        self.state.revision
    }

    /// Apply `edit` if `known_revision` is current.
    ///
    /// Question and language changes replace the code with the matching
    /// starter text within the same revision.
    pub fn propose(
        &mut self,
        author: &Identity,
        edit: WorkspaceEdit,
        known_revision: u64,
    ) -> Result<WorkspaceState> {
        if known_revision != self.state.revision {
            return Err(SessionError::StaleRevision {
                known: known_revision,
                current: self.state.revision,
            });
        }

        match edit {
            WorkspaceEdit::Question(id) => {
                let question = catalog::find_question(&id)
                    .ok_or_else(|| SessionError::UnknownQuestion(id.clone()))?;
                self.state.question_id = question.id.to_string();
                self.state.code = question.starter_code(self.state.language).to_string();
            }
            WorkspaceEdit::Language(language) => {
                let question = catalog::find_question(&self.state.question_id)
                    .unwrap_or_else(catalog::default_question);
                self.state.language = language;
                self.state.code = question.starter_code(language).to_string();
            }
            WorkspaceEdit::Code(code) => {
                self.state.code = code;
            }
        }

        self.state.revision += 1;
        self.state.updated_by = Some(author.clone());
        Ok(self.state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn alice() -> Identity {
        "alice".into()
    }

    #[test]
    fn starts_on_first_question_in_javascript() {
        let ws = Workspace::new();
        let state = ws.snapshot();
        assert_eq!(state.question_id, "two-sum");
        assert_eq!(state.language, Language::JavaScript);
        assert!(state.code.contains("twoSum"));
        assert_eq!(state.revision, 0);
    }

    #[test]
    fn stale_revision_is_rejected_without_effect() {
        let mut ws = Workspace::new();
        ws.propose(&alice(), WorkspaceEdit::Code("a".into()), 0)
            .unwrap();

        let err = ws
            .propose(&"bob".into(), WorkspaceEdit::Code("b".into()), 0)
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::StaleRevision {
                known: 0,
                current: 1
            }
        ));
        assert_eq!(ws.snapshot().code, "a");
        assert_eq!(ws.revision(), 1);
    }

    #[test]
    fn language_change_resets_code_in_one_revision() {
        let mut ws = Workspace::new();
        ws.propose(&alice(), WorkspaceEdit::Code("scratch".into()), 0)
            .unwrap();

        let state = ws
            .propose(&alice(), WorkspaceEdit::Language(Language::Python), 1)
            .unwrap();
        assert_eq!(state.revision, 2);
        assert_eq!(state.language, Language::Python);
        assert!(state.code.starts_with("def two_sum"));
    }

    #[test]
    fn question_change_uses_current_language() {
        let mut ws = Workspace::new();
        ws.propose(&alice(), WorkspaceEdit::Language(Language::Java), 0)
            .unwrap();
        let state = ws
            .propose(
                &"bob".into(),
                WorkspaceEdit::Question("palindrome-number".into()),
                1,
            )
            .unwrap();

        assert_eq!(state.question_id, "palindrome-number");
        assert!(state.code.contains("isPalindrome(int x)"));
        assert_eq!(state.updated_by, Some("bob".into()));
    }

    #[test]
    fn unknown_question_does_not_bump_revision() {
        let mut ws = Workspace::new();
        let err = ws
            .propose(&alice(), WorkspaceEdit::Question("nope".into()), 0)
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownQuestion(_)));
        assert_eq!(ws.revision(), 0);
    }

    proptest! {
        #[test]
        fn accepted_edits_advance_revision_by_one(
            edits in proptest::collection::vec(("[a-z]{0,8}", any::<bool>()), 1..40)
        ) {
            let mut ws = Workspace::new();
            let mut expected = 0u64;
            for (code, stale) in edits {
                let known = if stale { expected.wrapping_add(7) } else { expected };
                match ws.propose(&alice(), WorkspaceEdit::Code(code), known) {
                    Ok(state) => {
                        prop_assert!(!stale);
                        expected += 1;
                        prop_assert_eq!(state.revision, expected);
                    }
                    Err(_) => prop_assert!(stale),
                }
                prop_assert_eq!(ws.revision(), expected);
            }
        }
    }
}
