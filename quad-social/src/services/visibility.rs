//! Privacy-scoped post visibility.
//!
//! The policy is evaluated against a [`SocialGraph`] snapshot so the same
//! decision logic serves both the single-post check and the bulk feed
//! filter. [`load_graph`] pulls exactly the friendship rows and roles a set
//! of posts needs for one viewer.
//!
//! Feeds are too large to judge post by post, so [`Audience`] turns the
//! same rules into the sets of authors a viewer may read, computed from the
//! viewer's neighbourhood alone ([`load_neighbourhood`]). Those sets become
//! a SQL predicate and the database pages the result.

use std::collections::{HashMap, HashSet};

use diesel::pg::PgConnection;
use diesel::prelude::*;
use uuid::Uuid;

use quad_shared::errors::AppResult;

use crate::models::{Post, Privacy, Role};
use crate::schema::{friendships, profiles};

/// Who is looking at the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    User(Uuid),
}

impl Viewer {
    pub fn from_option(user_id: Option<Uuid>) -> Self {
        user_id.map(Viewer::User).unwrap_or(Viewer::Anonymous)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Viewer::Anonymous => None,
            Viewer::User(id) => Some(*id),
        }
    }
}

/// The parts of a post the policy looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostFacts {
    pub id: Uuid,
    pub author_id: Uuid,
    pub privacy: Privacy,
}

impl PostFacts {
    pub fn from_post(post: &Post) -> AppResult<Self> {
        Ok(Self {
            id: post.id,
            author_id: post.author_id,
            privacy: post.privacy()?,
        })
    }
}

/// Directed friendship rows and profile roles for a slice of the user base.
///
/// `friends` mirrors the friendship table: an entry `a -> {b}` means a row
/// with `user_id = a, friend_id = b` exists. A user absent from `roles` has
/// no profile.
#[derive(Debug, Default, Clone)]
pub struct SocialGraph {
    friends: HashMap<Uuid, HashSet<Uuid>>,
    roles: HashMap<Uuid, Role>,
}

impl SocialGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_friendship_row(&mut self, user_id: Uuid, friend_id: Uuid) {
        self.friends.entry(user_id).or_default().insert(friend_id);
    }

    /// Insert both directions, the way an accepted request materializes.
    pub fn add_friendship(&mut self, a: Uuid, b: Uuid) {
        self.add_friendship_row(a, b);
        self.add_friendship_row(b, a);
    }

    pub fn add_profile(&mut self, user_id: Uuid, role: Role) {
        self.roles.insert(user_id, role);
    }

    pub fn has_row(&self, user_id: Uuid, friend_id: Uuid) -> bool {
        self.friends
            .get(&user_id)
            .is_some_and(|set| set.contains(&friend_id))
    }

    pub fn role(&self, user_id: Uuid) -> Option<Role> {
        self.roles.get(&user_id).copied()
    }

    /// Friends reachable from `user_id` as the source side. Restartable: call
    /// again for a fresh pass.
    pub fn friends_of(&self, user_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.friends
            .get(&user_id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }
}

/// Single-post decision. Rules are applied in order and the first match wins.
pub fn can_view(graph: &SocialGraph, viewer: Viewer, post: &PostFacts) -> bool {
    if viewer.user_id() == Some(post.author_id) {
        return true;
    }
    if post.privacy == Privacy::Public {
        return true;
    }
    let viewer_id = match viewer {
        Viewer::Anonymous => return false,
        Viewer::User(id) => id,
    };

    match post.privacy {
        Privacy::Public => true,
        Privacy::FriendsOnly => graph.has_row(post.author_id, viewer_id),
        Privacy::CioWide => {
            let (Some(author_role), Some(_)) = (graph.role(post.author_id), graph.role(viewer_id))
            else {
                return false;
            };
            if author_role == Role::Cio {
                graph.has_row(post.author_id, viewer_id)
            } else {
                graph.friends_of(post.author_id).any(|common| {
                    graph.role(common) == Some(Role::Cio) && graph.has_row(viewer_id, common)
                })
            }
        }
    }
}

/// Bulk filter over a feed page. Keeps input order and drops repeated ids.
///
/// Works set-wise from the viewer's side: the viewer's CIO friends are
/// computed once and every CIO-wide post is matched against that set. The
/// membership must equal running [`can_view`] on every post.
pub fn filter_viewable(graph: &SocialGraph, viewer: Viewer, posts: &[PostFacts]) -> Vec<PostFacts> {
    let mut seen = HashSet::new();

    let viewer_id = match viewer {
        Viewer::Anonymous => {
            return posts
                .iter()
                .filter(|p| p.privacy == Privacy::Public && seen.insert(p.id))
                .copied()
                .collect();
        }
        Viewer::User(id) => id,
    };

    let viewer_has_profile = graph.role(viewer_id).is_some();
    let cio_friends: HashSet<Uuid> = graph
        .friends_of(viewer_id)
        .filter(|f| graph.role(*f) == Some(Role::Cio))
        .collect();

    posts
        .iter()
        .filter(|p| {
            let visible = p.author_id == viewer_id
                || match p.privacy {
                    Privacy::Public => true,
                    Privacy::FriendsOnly => graph.has_row(p.author_id, viewer_id),
                    Privacy::CioWide => {
                        viewer_has_profile
                            && match graph.role(p.author_id) {
                                None => false,
                                Some(Role::Cio) => graph.has_row(p.author_id, viewer_id),
                                Some(_) => graph
                                    .friends_of(p.author_id)
                                    .any(|f| cio_friends.contains(&f)),
                            }
                    }
                };
            visible && seen.insert(p.id)
        })
        .copied()
        .collect()
}

/// Authors whose restricted posts one viewer may read.
///
/// Public posts and the viewer's own posts need no lookup and are not
/// listed. Both lists are sorted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Audience {
    pub friends_only: Vec<Uuid>,
    pub cio_wide: Vec<Uuid>,
}

impl Audience {
    /// Same answer as [`can_view`] on the graph the audience came from.
    pub fn admits(&self, viewer: Viewer, post: &PostFacts) -> bool {
        if viewer.user_id() == Some(post.author_id) {
            return true;
        }
        match post.privacy {
            Privacy::Public => true,
            Privacy::FriendsOnly => self.friends_only.binary_search(&post.author_id).is_ok(),
            Privacy::CioWide => self.cio_wide.binary_search(&post.author_id).is_ok(),
        }
    }
}

/// Only authors with at least one friendship row can be admitted, so walking
/// the rows in `graph` is enough.
pub fn audience(graph: &SocialGraph, viewer: Viewer) -> Audience {
    let Viewer::User(viewer_id) = viewer else {
        return Audience::default();
    };

    let viewer_has_profile = graph.role(viewer_id).is_some();
    let cio_friends: HashSet<Uuid> = graph
        .friends_of(viewer_id)
        .filter(|f| graph.role(*f) == Some(Role::Cio))
        .collect();

    let mut out = Audience::default();
    for (&author, friends) in &graph.friends {
        if author == viewer_id {
            continue;
        }
        let befriended_viewer = friends.contains(&viewer_id);
        if befriended_viewer {
            out.friends_only.push(author);
        }
        if !viewer_has_profile {
            continue;
        }
        let cio_wide = match graph.role(author) {
            None => false,
            Some(Role::Cio) => befriended_viewer,
            Some(_) => friends.iter().any(|f| cio_friends.contains(f)),
        };
        if cio_wide {
            out.cio_wide.push(author);
        }
    }

    out.friends_only.sort_unstable();
    out.cio_wide.sort_unstable();
    out
}

/// Moderation hiding sits on top of the privacy decision.
pub fn can_view_hidden(viewer: Viewer, author_id: Uuid, is_moderator: bool) -> bool {
    is_moderator || viewer.user_id() == Some(author_id)
}

/// Load the friendship rows and roles needed to judge `posts` for `viewer`.
pub fn load_graph(conn: &mut PgConnection, viewer: Viewer, posts: &[PostFacts]) -> AppResult<SocialGraph> {
    let mut graph = SocialGraph::new();

    let needs_graph = viewer.user_id().is_some()
        && posts.iter().any(|p| p.privacy != Privacy::Public);
    if !needs_graph {
        return Ok(graph);
    }

    let mut involved: HashSet<Uuid> = posts.iter().map(|p| p.author_id).collect();
    involved.extend(viewer.user_id());
    let involved: Vec<Uuid> = involved.into_iter().collect();

    let rows: Vec<(Uuid, Uuid)> = friendships::table
        .filter(friendships::user_id.eq_any(&involved))
        .select((friendships::user_id, friendships::friend_id))
        .load(conn)?;

    let mut with_roles: HashSet<Uuid> = involved.iter().copied().collect();
    for (user_id, friend_id) in &rows {
        graph.add_friendship_row(*user_id, *friend_id);
        with_roles.insert(*friend_id);
    }

    load_roles(conn, &mut graph, with_roles)?;
    Ok(graph)
}

fn load_roles(conn: &mut PgConnection, graph: &mut SocialGraph, users: HashSet<Uuid>) -> AppResult<()> {
    if users.is_empty() {
        return Ok(());
    }
    let users: Vec<Uuid> = users.into_iter().collect();
    let roles: Vec<(Uuid, String)> = profiles::table
        .filter(profiles::user_id.eq_any(&users))
        .select((profiles::user_id, profiles::role))
        .load(conn)?;

    for (user_id, role) in roles {
        match role.parse::<Role>() {
            Ok(role) => graph.add_profile(user_id, role),
            Err(e) => tracing::error!(user_id = %user_id, error = %e, "profile with unknown role"),
        }
    }
    Ok(())
}

/// The rows [`audience`] needs for one viewer: the viewer's own friendships
/// in both directions, and every row pointing at one of the viewer's CIO
/// friends. Size follows the viewer's circle, not the forum.
pub fn load_neighbourhood(conn: &mut PgConnection, viewer_id: Uuid) -> AppResult<SocialGraph> {
    let mut graph = SocialGraph::new();

    let rows: Vec<(Uuid, Uuid)> = friendships::table
        .filter(friendships::user_id.eq(viewer_id).or(friendships::friend_id.eq(viewer_id)))
        .select((friendships::user_id, friendships::friend_id))
        .load(conn)?;

    let mut people = HashSet::from([viewer_id]);
    for (user_id, friend_id) in rows {
        graph.add_friendship_row(user_id, friend_id);
        people.insert(user_id);
        people.insert(friend_id);
    }
    load_roles(conn, &mut graph, people)?;

    let cio_friends: Vec<Uuid> = graph
        .friends_of(viewer_id)
        .filter(|f| graph.role(*f) == Some(Role::Cio))
        .collect();
    if cio_friends.is_empty() {
        return Ok(graph);
    }

    let linked: Vec<(Uuid, Uuid)> = friendships::table
        .filter(friendships::friend_id.eq_any(&cio_friends))
        .select((friendships::user_id, friendships::friend_id))
        .load(conn)?;

    let mut unseen = HashSet::new();
    for (user_id, friend_id) in linked {
        graph.add_friendship_row(user_id, friend_id);
        if graph.role(user_id).is_none() {
            unseen.insert(user_id);
        }
    }
    load_roles(conn, &mut graph, unseen)?;

    Ok(graph)
}
