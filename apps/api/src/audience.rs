//! Post exclusivity.
//!
//! A post's audience holds the ids of the users allowed to read it. The
//! single entry `EVERYONE` opens the post to every logged-in user.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::models::PostRow;

/// Audience sentinel meaning "every user".
pub const EVERYONE: &str = "";

pub fn is_public(audience: &[String]) -> bool {
    audience.iter().any(|member| member == EVERYONE)
}

pub fn can_view(post: &PostRow, viewer: Uuid) -> bool {
    is_public(&post.audience) || post.audience.contains(&viewer.to_string())
}

pub fn filter_viewable(posts: Vec<PostRow>, viewer: Uuid) -> Vec<PostRow> {
    posts.into_iter().filter(|post| can_view(post, viewer)).collect()
}

/// What a requested audience resolves to before usernames are looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestedAudience {
    Everyone,
    /// Trimmed, de-duplicated usernames; always includes the author. A blank
    /// name stays in as `""` and fails the username lookup.
    Members(BTreeSet<String>),
}

impl RequestedAudience {
    pub fn parse(requested: &[String], author_username: &str) -> Self {
        if requested.iter().any(|member| member == EVERYONE) {
            return RequestedAudience::Everyone;
        }
        let mut members: BTreeSet<String> = requested
            .iter()
            .map(|member| member.trim().to_string())
            .collect();
        members.insert(author_username.to_string());
        RequestedAudience::Members(members)
    }
}

/// Removes `member` from the audience. Returns whether it was present.
pub fn remove_member(audience: &mut Vec<String>, member: Uuid) -> bool {
    let member = member.to_string();
    let before = audience.len();
    audience.retain(|m| *m != member);
    before != audience.len()
}
