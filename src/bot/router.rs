//! Resolution of the identity an inbound message acts as.

use tracing::{debug, info};

use super::commands::Command;
use crate::access::AccessController;
use crate::transport::{Identity, InboundMessage};

/// Outcome of routing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Handle the message in the context of `identity`.
    Allowed {
        identity: Identity,
        /// The message redeemed a token; the owner must be told.
        redeemed: bool,
    },
    /// Drop the message, answering with an access notice when `notify`.
    Denied { notify: bool },
}

/// Decide which context `msg` belongs to.
///
/// The chat itself is used when it is allowed, or becomes allowed by
/// redeeming the token of a `/start` command. A disallowed chat whose
/// sender is allowed is routed to the sender's context.
pub fn resolve(access: &AccessController, msg: &InboundMessage, command: Option<&Command>) -> Route {
    let chat = msg.chat.id;
    if access.is_allowed(chat) {
        return Route::Allowed {
            identity: chat,
            redeemed: false,
        };
    }

    if let Some(Command::Start(token)) = command {
        if !token.is_empty() && access.redeem(token, chat).is_ok() {
            info!(%chat, name = %msg.chat.name, "chat redeemed an access token");
            return Route::Allowed {
                identity: chat,
                redeemed: true,
            };
        }
    }

    if let Some(sender) = msg.sender.filter(|sender| access.is_allowed(*sender)) {
        debug!(%chat, %sender, "routing to the sender's context");
        return Route::Allowed {
            identity: sender,
            redeemed: false,
        };
    }

    debug!(%chat, "message from disallowed chat");
    Route::Denied {
        notify: command.is_some() && !msg.edited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChatInfo;

    const OWNER: Identity = Identity(1);

    fn msg(chat: ChatInfo, text: &str) -> (InboundMessage, Option<Command>) {
        let msg = InboundMessage::text(10, chat, text);
        let command = Command::parse(text);
        (msg, command)
    }

    #[test]
    fn test_owner_chat_allowed() {
        let access = AccessController::new(OWNER);
        let (m, c) = msg(ChatInfo::user(1, "owner"), "/status");
        assert_eq!(
            resolve(&access, &m, c.as_ref()),
            Route::Allowed {
                identity: OWNER,
                redeemed: false
            }
        );
    }

    #[test]
    fn test_stranger_denied() {
        let access = AccessController::new(OWNER);
        let (m, c) = msg(ChatInfo::user(2, "x"), "/run ls");
        assert_eq!(resolve(&access, &m, c.as_ref()), Route::Denied { notify: true });

        let (m, c) = msg(ChatInfo::user(2, "x"), "hello");
        assert_eq!(resolve(&access, &m, c.as_ref()), Route::Denied { notify: false });
    }

    #[test]
    fn test_token_redemption() {
        let access = AccessController::new(OWNER);
        let token = access.issue_token().unwrap();
        let (m, c) = msg(ChatInfo::user(2, "x"), &format!("/start {}", token));

        assert_eq!(
            resolve(&access, &m, c.as_ref()),
            Route::Allowed {
                identity: Identity(2),
                redeemed: true
            }
        );
        assert!(access.is_allowed(Identity(2)));

        // The chat is now allowed on its own.
        assert_eq!(
            resolve(&access, &m, c.as_ref()),
            Route::Allowed {
                identity: Identity(2),
                redeemed: false
            }
        );
    }

    #[test]
    fn test_bad_token_denied() {
        let access = AccessController::new(OWNER);
        let (m, c) = msg(ChatInfo::user(2, "x"), "/start nope");
        assert_eq!(resolve(&access, &m, c.as_ref()), Route::Denied { notify: true });
        assert!(!access.is_allowed(Identity(2)));
    }

    #[test]
    fn test_group_delegates_to_allowed_sender() {
        let access = AccessController::new(OWNER);
        access.grant(Identity(5)).unwrap();

        let (m, c) = msg(ChatInfo::group(-100, "ops"), "/status");
        let m = m.from_sender(Identity(5));
        assert_eq!(
            resolve(&access, &m, c.as_ref()),
            Route::Allowed {
                identity: Identity(5),
                redeemed: false
            }
        );

        let m = m.from_sender(Identity(6));
        assert_eq!(resolve(&access, &m, c.as_ref()), Route::Denied { notify: true });
    }
}
