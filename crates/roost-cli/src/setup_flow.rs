//! First-admin provisioning as an explicit state machine.
//!
//! A duplicate email never overwrites anything silently: the user picks one
//! of four deterministic branches before any write happens.

use anyhow::Result;
use roost_core::users::{Role, User, UserStore};

use crate::prompt::Prompter;
use crate::ui::Ui;

/// Resolution chosen when the requested email already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DuplicateChoice {
    DifferentEmail,
    ResetPassword,
    RecreateStore,
    Abort,
}

/// Terminal state of the flow.
#[derive(Debug)]
pub enum SetupOutcome {
    /// New admin created; password shown once.
    Created { user: User, password: String },
    /// Existing admin kept, credentials regenerated.
    PasswordReset { email: String, password: String },
    /// User backed out; nothing was written.
    Aborted,
}

enum State {
    AskEmail,
    ResolveDuplicate { email: String },
    Confirm { email: String, wipe_first: bool },
    Commit { email: String, wipe_first: bool },
}

/// Drive the first-admin flow to completion.
pub async fn run_first_admin(
    store: &UserStore,
    ui: &dyn Ui,
    prompter: &mut dyn Prompter,
) -> Result<SetupOutcome> {
    let mut state = State::AskEmail;

    loop {
        state = match state {
            State::AskEmail => {
                let email = prompter.ask("Admin email")?;
                if email.is_empty() {
                    ui.warn("Email cannot be empty.");
                    State::AskEmail
                } else if !email.contains('@') {
                    ui.warn(&format!("'{email}' is not a valid email address."));
                    State::AskEmail
                } else if store.find_user(&email).await?.is_some() {
                    State::ResolveDuplicate { email }
                } else {
                    State::Confirm {
                        email,
                        wipe_first: false,
                    }
                }
            }

            State::ResolveDuplicate { email } => {
                ui.warn(&format!("A user with email {email} already exists."));
                match ask_duplicate_choice(ui, prompter)? {
                    DuplicateChoice::DifferentEmail => State::AskEmail,
                    DuplicateChoice::ResetPassword => {
                        let password = store.reset_password(&email).await?;
                        return Ok(SetupOutcome::PasswordReset { email, password });
                    }
                    DuplicateChoice::RecreateStore => {
                        // Wiping drops every account; demand the word, not
                        // just a keypress.
                        let typed = prompter
                            .ask("This deletes ALL users and sessions. Type 'destroy' to proceed")?;
                        if typed == "destroy" {
                            State::Confirm {
                                email,
                                wipe_first: true,
                            }
                        } else {
                            ui.info("Recreate cancelled.");
                            State::ResolveDuplicate { email }
                        }
                    }
                    DuplicateChoice::Abort => return Ok(SetupOutcome::Aborted),
                }
            }

            State::Confirm { email, wipe_first } => {
                let question = if wipe_first {
                    format!("Recreate the user store with admin {email}?")
                } else {
                    format!("Create admin {email}?")
                };
                if prompter.confirm(&question, true)? {
                    State::Commit { email, wipe_first }
                } else {
                    return Ok(SetupOutcome::Aborted);
                }
            }

            State::Commit { email, wipe_first } => {
                if wipe_first {
                    store.wipe().await?;
                }
                let (user, password) = store.create_user(&email, Role::Admin).await?;
                return Ok(SetupOutcome::Created { user, password });
            }
        };
    }
}

fn ask_duplicate_choice(ui: &dyn Ui, prompter: &mut dyn Prompter) -> Result<DuplicateChoice> {
    ui.plain("  1) Use a different email");
    ui.plain("  2) Reset that user's password");
    ui.plain("  3) Destroy and recreate the user store");
    ui.plain("  4) Abort");
    loop {
        match prompter.ask("Choice [1-4]")?.as_str() {
            "1" => return Ok(DuplicateChoice::DifferentEmail),
            "2" => return Ok(DuplicateChoice::ResetPassword),
            "3" => return Ok(DuplicateChoice::RecreateStore),
            "4" => return Ok(DuplicateChoice::Abort),
            other => ui.warn(&format!("'{other}' is not a valid choice.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::testing::ScriptedPrompter;
    use crate::ui::testing::CaptureUi;

    async fn store_with_admin(email: &str) -> UserStore {
        let store = UserStore::open_in_memory().unwrap();
        store.create_user(email, Role::Admin).await.unwrap();
        store
    }

    #[tokio::test]
    async fn fresh_email_creates_admin() {
        let store = UserStore::open_in_memory().unwrap();
        let ui = CaptureUi::default();
        let mut prompter = ScriptedPrompter::new(&["admin@example.com", "y"]);

        let outcome = run_first_admin(&store, &ui, &mut prompter).await.unwrap();
        match outcome {
            SetupOutcome::Created { user, password } => {
                assert_eq!(user.email, "admin@example.com");
                assert_eq!(user.role, Role::Admin);
                assert_eq!(password.len(), 16);
            }
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_then_different_email() {
        let store = store_with_admin("old@example.com").await;
        let ui = CaptureUi::default();
        let mut prompter =
            ScriptedPrompter::new(&["old@example.com", "1", "new@example.com", "y"]);

        let outcome = run_first_admin(&store, &ui, &mut prompter).await.unwrap();
        assert!(matches!(
            outcome,
            SetupOutcome::Created { ref user, .. } if user.email == "new@example.com"
        ));
        assert_eq!(store.count_users().await.unwrap(), 2);
        assert!(ui.contains("already exists"));
    }

    #[tokio::test]
    async fn duplicate_then_reset_password() {
        let store = store_with_admin("old@example.com").await;
        let ui = CaptureUi::default();
        let mut prompter = ScriptedPrompter::new(&["old@example.com", "2"]);

        let outcome = run_first_admin(&store, &ui, &mut prompter).await.unwrap();
        match outcome {
            SetupOutcome::PasswordReset { email, password } => {
                assert_eq!(email, "old@example.com");
                assert!(store.verify_password(&email, &password).await.unwrap());
            }
            other => panic!("expected PasswordReset, got {other:?}"),
        }
        // Nothing new was created.
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_then_recreate_requires_typed_destroy() {
        let store = store_with_admin("old@example.com").await;
        let ui = CaptureUi::default();
        // Wrong word first: recreate is cancelled, menu comes back, abort.
        let mut prompter = ScriptedPrompter::new(&["old@example.com", "3", "yes", "4"]);

        let outcome = run_first_admin(&store, &ui, &mut prompter).await.unwrap();
        assert!(matches!(outcome, SetupOutcome::Aborted));
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_then_recreate_wipes_store() {
        let store = store_with_admin("old@example.com").await;
        let ui = CaptureUi::default();
        let mut prompter =
            ScriptedPrompter::new(&["old@example.com", "3", "destroy", "y"]);

        let outcome = run_first_admin(&store, &ui, &mut prompter).await.unwrap();
        assert!(matches!(
            outcome,
            SetupOutcome::Created { ref user, .. } if user.email == "old@example.com"
        ));
        // Only the freshly created admin remains.
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn abort_leaves_store_untouched() {
        let store = store_with_admin("old@example.com").await;
        let ui = CaptureUi::default();
        let mut prompter = ScriptedPrompter::new(&["old@example.com", "4"]);

        let outcome = run_first_admin(&store, &ui, &mut prompter).await.unwrap();
        assert!(matches!(outcome, SetupOutcome::Aborted));
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn declined_confirmation_aborts() {
        let store = UserStore::open_in_memory().unwrap();
        let ui = CaptureUi::default();
        let mut prompter = ScriptedPrompter::new(&["admin@example.com", "n"]);

        let outcome = run_first_admin(&store, &ui, &mut prompter).await.unwrap();
        assert!(matches!(outcome, SetupOutcome::Aborted));
        assert_eq!(store.count_users().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_menu_choice_reprompts() {
        let store = store_with_admin("old@example.com").await;
        let ui = CaptureUi::default();
        let mut prompter = ScriptedPrompter::new(&["old@example.com", "7", "4"]);

        let outcome = run_first_admin(&store, &ui, &mut prompter).await.unwrap();
        assert!(matches!(outcome, SetupOutcome::Aborted));
        assert!(ui.contains("not a valid choice"));
    }

    #[tokio::test]
    async fn email_without_at_sign_reprompts() {
        let store = UserStore::open_in_memory().unwrap();
        let ui = CaptureUi::default();
        let mut prompter = ScriptedPrompter::new(&["no-at-sign", "admin@example.com", "y"]);

        let outcome = run_first_admin(&store, &ui, &mut prompter).await.unwrap();
        assert!(matches!(
            outcome,
            SetupOutcome::Created { ref user, .. } if user.email == "admin@example.com"
        ));
        assert!(ui.contains("not a valid email"));
        assert_eq!(store.count_users().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_email_reprompts() {
        let store = UserStore::open_in_memory().unwrap();
        let ui = CaptureUi::default();
        let mut prompter = ScriptedPrompter::new(&["", "admin@example.com", "y"]);

        let outcome = run_first_admin(&store, &ui, &mut prompter).await.unwrap();
        assert!(matches!(outcome, SetupOutcome::Created { .. }));
        assert!(ui.contains("cannot be empty"));
    }
}
