//! Fast Cache key layout.

use uuid::Uuid;

use super::Edge;
use crate::users::repo_types::Lookup;

pub const LIVING: &str = "living";

/// `user:id:<id>` for records, `user:<kind>:<value>` for index entries.
pub fn user(lookup: &Lookup) -> String {
    format!("user:{lookup}")
}

pub fn record(id: i64) -> String {
    user(&Lookup::Id(id))
}

pub fn history(viewer: i64) -> String {
    format!("user:history:{viewer}")
}

pub fn edge(edge: Edge, username: &str) -> String {
    match edge {
        Edge::Followers => format!("user:followers:{username}"),
        Edge::Followings => format!("user:followings:{username}"),
    }
}

pub fn living_since(username: &str) -> String {
    format!("{LIVING}:{username}")
}

/// Sorted-set members must be unique per watch, so each one gets a nonce.
pub fn history_member(username: &str) -> String {
    format!("{}:{}", Uuid::new_v4().simple(), username)
}

pub fn history_username(member: &str) -> Option<&str> {
    member.split_once(':').map(|(_, username)| username)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_scheme() {
        assert_eq!(record(42), "user:id:42");
        assert_eq!(user(&Lookup::Username("bob".into())), "user:username:bob");
        assert_eq!(user(&Lookup::Email("b@x.com".into())), "user:email:b@x.com");
        assert_eq!(user(&Lookup::Phone("+15550100".into())), "user:phone:+15550100");
        assert_eq!(history(1), "user:history:1");
        assert_eq!(living_since("bob"), "living:bob");
        assert_eq!(edge(Edge::Followers, "bob"), "user:followers:bob");
        assert_eq!(edge(Edge::Followings, "bob"), "user:followings:bob");
    }

    #[test]
    fn history_members_are_unique_and_decodable() {
        let a = history_member("bob");
        let b = history_member("bob");
        assert_ne!(a, b);
        assert_eq!(history_username(&a), Some("bob"));
        assert_eq!(history_username("garbage"), None);
    }
}
