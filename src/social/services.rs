use tracing::{debug, info, instrument};

use crate::cache::{keys, Edge};
use crate::directory::Directory;
use crate::error::UserError;
use crate::users::dto::PublicUser;
use crate::users::repo_types::{Lookup, User};

impl Directory {
    #[instrument(skip(self))]
    pub async fn follow(&self, follower: &str, followee: &str) -> Result<(), UserError> {
        if follower == followee {
            return Err(UserError::SelfFollow);
        }
        self.resolve(Lookup::Username(followee.to_owned())).await?;
        let key = keys::edge(Edge::Followers, followee);
        self.on_cache("follow", &key, self.cache.link(follower, followee))
            .await?;
        info!("followed");
        Ok(())
    }

    /// Removing an edge that does not exist is a successful no-op. The
    /// followee need not resolve any more, so edges to removed users can
    /// still be dropped.
    #[instrument(skip(self))]
    pub async fn unfollow(&self, follower: &str, followee: &str) -> Result<(), UserError> {
        let key = keys::edge(Edge::Followers, followee);
        self.on_cache("unfollow", &key, self.cache.unlink(follower, followee))
            .await?;
        info!("unfollowed");
        Ok(())
    }

    pub async fn list_followers(&self, username: &str) -> Result<Vec<PublicUser>, UserError> {
        self.list_edge(Edge::Followers, username).await
    }

    pub async fn list_followings(&self, username: &str) -> Result<Vec<PublicUser>, UserError> {
        self.list_edge(Edge::Followings, username).await
    }

    #[instrument(skip(self))]
    async fn list_edge(&self, edge: Edge, username: &str) -> Result<Vec<PublicUser>, UserError> {
        self.resolve(Lookup::Username(username.to_owned())).await?;
        let key = keys::edge(edge, username);
        let mut members = self
            .on_cache("list_edge", &key, self.cache.members(edge, username))
            .await?;
        members.sort();

        let mut users = Vec::with_capacity(members.len());
        for member in members {
            match self.public_user(&member).await {
                Ok(user) => users.push(user),
                Err(UserError::NotFound) => debug!(%member, "skipping unresolvable member"),
                Err(e) => return Err(e),
            }
        }
        Ok(users)
    }

    pub async fn public_user(&self, username: &str) -> Result<PublicUser, UserError> {
        let user = self.resolve(Lookup::Username(username.to_owned())).await?;
        self.project(user).await
    }

    /// Public projection: room, presence and follow counts, nothing private.
    pub async fn project(&self, user: User) -> Result<PublicUser, UserError> {
        let name = user.username.as_str();
        let since_key = keys::living_since(name);
        let followers_key = keys::edge(Edge::Followers, name);
        let followings_key = keys::edge(Edge::Followings, name);
        let (living, living_since, followers, followings) = tokio::try_join!(
            self.on_cache("project", keys::LIVING, self.cache.is_live(name)),
            self.on_cache("project", &since_key, self.cache.live_since(name)),
            self.on_cache("project", &followers_key, self.cache.count(Edge::Followers, name)),
            self.on_cache("project", &followings_key, self.cache.count(Edge::Followings, name)),
        )?;
        Ok(PublicUser {
            living,
            living_since: living_since.filter(|_| living),
            followers,
            followings,
            live_name: user.room_name().map(str::to_owned),
            live_intro: user.room_intro().map(str::to_owned),
            username: user.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FastCache;
    use crate::directory::testing::{directory, new_user};

    async fn with_users(names: &[&str]) -> (Directory, crate::cache::MemoryCache) {
        let (dir, cache, _) = directory();
        for name in names {
            dir.create_user(new_user(name)).await.unwrap();
        }
        (dir, cache)
    }

    fn names(users: &[PublicUser]) -> Vec<&str> {
        users.iter().map(|u| u.username.as_str()).collect()
    }

    #[tokio::test]
    async fn self_follow_is_rejected() {
        let (dir, _) = with_users(&["alice"]).await;
        let err = dir.follow("alice", "alice").await.unwrap_err();
        assert!(matches!(err, UserError::SelfFollow));
    }

    #[tokio::test]
    async fn following_an_unknown_user_is_not_found() {
        let (dir, cache) = with_users(&["alice"]).await;
        let err = dir.follow("alice", "nobody").await.unwrap_err();
        assert!(matches!(err, UserError::NotFound));
        assert_eq!(cache.count(Edge::Followings, "alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn follow_list_unfollow_roundtrip() {
        let (dir, _) = with_users(&["a", "b"]).await;
        dir.follow("a", "b").await.unwrap();

        assert_eq!(names(&dir.list_followers("b").await.unwrap()), ["a"]);
        assert_eq!(names(&dir.list_followings("a").await.unwrap()), ["b"]);
        let b = dir.public_user("b").await.unwrap();
        assert_eq!((b.followers, b.followings), (1, 0));

        dir.unfollow("a", "b").await.unwrap();
        assert!(dir.list_followers("b").await.unwrap().is_empty());
        assert!(dir.list_followings("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unfollow_without_edge_is_idempotent() {
        let (dir, cache) = with_users(&["a", "b"]).await;
        dir.unfollow("a", "b").await.unwrap();
        dir.unfollow("a", "b").await.unwrap();
        assert_eq!(cache.count(Edge::Followers, "b").await.unwrap(), 0);
        assert_eq!(cache.count(Edge::Followings, "a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn listing_skips_members_that_no_longer_resolve() {
        let (dir, cache) = with_users(&["a", "b"]).await;
        dir.follow("a", "b").await.unwrap();
        cache.link("ghost", "b").await.unwrap();

        assert_eq!(names(&dir.list_followers("b").await.unwrap()), ["a"]);
    }

    #[tokio::test]
    async fn edge_to_a_removed_user_can_be_unfollowed() {
        let (dir, cache) = with_users(&["a"]).await;
        cache.link("a", "ghost").await.unwrap();
        assert_eq!(cache.count(Edge::Followings, "a").await.unwrap(), 1);

        dir.unfollow("a", "ghost").await.unwrap();
        assert_eq!(cache.count(Edge::Followings, "a").await.unwrap(), 0);
        assert_eq!(cache.count(Edge::Followers, "ghost").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cache_outage_fails_follow() {
        let (dir, cache) = with_users(&["a", "b"]).await;
        cache.set_failing(true);
        let err = dir.follow("a", "b").await.unwrap_err();
        assert!(matches!(err, UserError::Store { .. }));
    }
}
