use serde::{Deserialize, Serialize};

/// One chat message as stored in a downloaded chat log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "_id", default)]
    pub id: String,
    pub content_offset_seconds: f64,
    pub commenter: Commenter,
    pub message: CommentMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commenter {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentMessage {
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_color: Option<String>,
}

/// One page of the comments endpoint.
#[derive(Debug, Deserialize)]
pub struct CommentPage {
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(rename = "_next", default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VideoInfo {
    /// Length in seconds.
    pub length: u64,
}

#[derive(Debug, Deserialize)]
pub struct UserList {
    #[serde(default)]
    pub users: Vec<User>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}
