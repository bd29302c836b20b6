//! Typed notifications and the wire envelope they serialize into.
//!
//! Every command tag the backend emits has its own [`Notification`] variant
//! with a strongly-typed payload. The wire format stays the loose
//! `{command, data?}` [`Envelope`] that browser clients already understand.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::RealtimeError;

/// One donation line sent with `newDonat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DonationEntry {
    /// Donor display name.
    pub name: String,
    /// Donated amount, preformatted.
    pub total: String,
    /// Message attached to the donation.
    pub msg: String,
}

/// Payload of `newComment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentPosted {
    /// Post the comment belongs to.
    pub post_id: uuid::Uuid,
    /// Comment row as serialized by the backend.
    pub comment: Value,
}

/// Payload of `likeUpdate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LikeToggled {
    /// Liked post.
    pub post_id: uuid::Uuid,
    /// User who toggled the like.
    pub user_id: uuid::Uuid,
    /// State after the toggle.
    pub is_liked: bool,
}

/// Payload of `newPost`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PostPublished {
    /// Post row as serialized by the backend.
    pub post: Value,
}

/// Payload of `deletePost`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostDeleted {
    /// Deleted post.
    pub post_id: uuid::Uuid,
}

/// Payload of `deleteComment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentDeleted {
    /// Post the comment belonged to.
    pub post_id: uuid::Uuid,
    /// Deleted comment.
    pub comment_id: uuid::Uuid,
}

/// Payload of `updatePost`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostEdited {
    /// Edited post.
    pub post_id: uuid::Uuid,
    /// New post body.
    pub content: String,
}

/// A notification addressed to one user or to everyone.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Account activation completed.
    Activated,
    /// Wallet balance was credited.
    BalanceAdded,
    /// New donations received.
    NewDonation(Vec<DonationEntry>),
    /// Blog count changed. The payload is the live row count, fetched at
    /// send time by the notifier.
    NewBlog,
    /// A comment was added to a post.
    NewComment(CommentPosted),
    /// A like was toggled.
    LikeUpdate(LikeToggled),
    /// A post was published.
    NewPost(PostPublished),
    /// A post was deleted.
    DeletePost(PostDeleted),
    /// A comment was deleted.
    DeleteComment(CommentDeleted),
    /// A post body was edited.
    UpdatePost(PostEdited),
    /// Any other command, forwarded as-is.
    Custom {
        /// Command tag.
        command: String,
        /// Untyped payload.
        data: Option<Value>,
    },
}

impl Notification {
    /// Wire tag for this notification.
    #[must_use]
    pub fn command(&self) -> &str {
        match self {
            Self::Activated => "Activated",
            Self::BalanceAdded => "BalanceAdded",
            Self::NewDonation(_) => "newDonat",
            Self::NewBlog => "newblog",
            Self::NewComment(_) => "newComment",
            Self::LikeUpdate(_) => "likeUpdate",
            Self::NewPost(_) => "newPost",
            Self::DeletePost(_) => "deletePost",
            Self::DeleteComment(_) => "deleteComment",
            Self::UpdatePost(_) => "updatePost",
            Self::Custom { command, .. } => command,
        }
    }

    /// Builds a typed notification from the untyped `{command, data}` shape.
    ///
    /// `Activated`, `BalanceAdded` and `newblog` carry no caller data;
    /// whatever is supplied is dropped. Unknown commands become
    /// [`Notification::Custom`].
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::InvalidRequest`] for an empty command and
    /// [`RealtimeError::Serialization`] when a known command's `data` is
    /// missing or does not match its payload shape.
    pub fn from_command(command: &str, data: Option<Value>) -> Result<Self, RealtimeError> {
        let command = command.trim();
        match command {
            "" => Err(RealtimeError::InvalidRequest(
                "command must not be empty".to_string(),
            )),
            "Activated" => Ok(Self::Activated),
            "BalanceAdded" => Ok(Self::BalanceAdded),
            "newblog" => Ok(Self::NewBlog),
            "newDonat" => match data {
                None | Some(Value::Null) => Ok(Self::NewDonation(Vec::new())),
                Some(value) => Ok(Self::NewDonation(serde_json::from_value(value)?)),
            },
            "newComment" => Ok(Self::NewComment(typed_payload(command, data)?)),
            "likeUpdate" => Ok(Self::LikeUpdate(typed_payload(command, data)?)),
            "newPost" => Ok(Self::NewPost(typed_payload(command, data)?)),
            "deletePost" => Ok(Self::DeletePost(typed_payload(command, data)?)),
            "deleteComment" => Ok(Self::DeleteComment(typed_payload(command, data)?)),
            "updatePost" => Ok(Self::UpdatePost(typed_payload(command, data)?)),
            other => Ok(Self::Custom {
                command: other.to_string(),
                data,
            }),
        }
    }
}

fn typed_payload<T: serde::de::DeserializeOwned>(
    command: &str,
    data: Option<Value>,
) -> Result<T, RealtimeError> {
    let value = data.ok_or_else(|| {
        RealtimeError::Serialization(format!("command {command} requires a data payload"))
    })?;
    serde_json::from_value(value)
        .map_err(|e| RealtimeError::Serialization(format!("invalid {command} payload: {e}")))
}

/// Wire envelope written to clients as a single text frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Envelope {
    /// Command tag.
    pub command: String,
    /// Optional payload; omitted from the JSON when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// Envelope without payload.
    #[must_use]
    pub fn bare(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            data: None,
        }
    }

    /// The `newblog` envelope: its payload is the current blog total.
    #[must_use]
    pub fn blog_total(total: i64) -> Self {
        Self {
            command: "newblog".to_string(),
            data: Some(Value::from(total)),
        }
    }

    /// Serializes the envelope into a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Serialization`] if the payload cannot be
    /// encoded.
    pub fn to_text(&self) -> Result<String, RealtimeError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl TryFrom<Notification> for Envelope {
    type Error = RealtimeError;

    /// Converts every notification whose payload is known up front.
    /// [`Notification::NewBlog`] is rejected: its total must be fetched
    /// and passed to [`Envelope::blog_total`].
    fn try_from(notification: Notification) -> Result<Self, Self::Error> {
        let command = notification.command().to_string();
        let data = match notification {
            Notification::Activated | Notification::BalanceAdded => None,
            Notification::NewBlog => {
                return Err(RealtimeError::Internal(
                    "newblog total must be resolved before serialization".to_string(),
                ));
            }
            Notification::NewDonation(entries) => Some(serde_json::to_value(entries)?),
            Notification::NewComment(p) => Some(serde_json::to_value(p)?),
            Notification::LikeUpdate(p) => Some(serde_json::to_value(p)?),
            Notification::NewPost(p) => Some(serde_json::to_value(p)?),
            Notification::DeletePost(p) => Some(serde_json::to_value(p)?),
            Notification::DeleteComment(p) => Some(serde_json::to_value(p)?),
            Notification::UpdatePost(p) => Some(serde_json::to_value(p)?),
            Notification::Custom { data, .. } => data,
        };
        Ok(Self { command, data })
    }
}
