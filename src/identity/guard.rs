//! Navigation gate in front of the dashboard views. Decisions are made from a
//! session snapshot taken after initialization, never from a half-restored one.

use std::collections::HashSet;

use tracing::debug;

use super::principal::Role;
use super::session::{Session, SessionManager, SessionPhase};

pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub path: String,
    pub requires_auth: bool,
    /// Empty means any authenticated role.
    pub roles: HashSet<Role>,
}

impl RouteTarget {
    pub fn public(path: &str) -> Self {
        Self { path: path.to_string(), requires_auth: false, roles: HashSet::new() }
    }

    pub fn for_roles(path: &str, roles: &[Role]) -> Self {
        Self { path: path.to_string(), requires_auth: true, roles: roles.iter().copied().collect() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    RedirectToLogin,
    RedirectToHome(Role),
}

impl GuardDecision {
    pub fn redirect_path(&self) -> Option<String> {
        match self {
            GuardDecision::Allow => None,
            GuardDecision::RedirectToLogin => Some(LOGIN_PATH.to_string()),
            GuardDecision::RedirectToHome(role) => Some(role.home_path()),
        }
    }
}

pub fn decide(session: &Session, target: &RouteTarget) -> GuardDecision {
    let role = session.role();
    if target.path == LOGIN_PATH {
        return match role {
            Some(r) => GuardDecision::RedirectToHome(r),
            None => GuardDecision::Allow,
        };
    }
    let Some(role) = role else {
        return if target.requires_auth { GuardDecision::RedirectToLogin } else { GuardDecision::Allow };
    };
    if !target.roles.is_empty() && !target.roles.contains(&role) {
        return GuardDecision::RedirectToHome(role);
    }
    GuardDecision::Allow
}

pub struct RouteGuard {
    session: SessionManager,
}

impl RouteGuard {
    pub fn new(session: SessionManager) -> Self { Self { session } }

    /// Boots the session if nobody has yet, waits for initialization, then decides.
    pub async fn check(&self, target: &RouteTarget) -> GuardDecision {
        if self.session.snapshot().phase == SessionPhase::Uninitialized {
            self.session.boot().await;
        }
        let snap = self.session.wait_initialized().await;
        let decision = decide(&snap, target);
        debug!(target: "timeclock::session", "guard {} -> {:?}", target.path, decision);
        decision
    }

    /// Resolve `path` through `table` and check it. Unknown paths require
    /// authentication.
    pub async fn navigate(&self, table: &RouteTable, path: &str) -> GuardDecision {
        let target = table.resolve(path).unwrap_or_else(|| RouteTarget {
            path: normalize(path).to_string(),
            requires_auth: true,
            roles: HashSet::new(),
        });
        self.check(&target).await
    }
}

#[derive(Debug, Clone)]
enum RouteKind {
    Page { requires_auth: bool, roles: Vec<Role> },
    Redirect(String),
}

#[derive(Debug, Clone)]
struct Route {
    pattern: String,
    kind: RouteKind,
}

/// Patterns use `/segment`, `:param` and optional `:param?`.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

fn normalize(path: &str) -> &str {
    path.split(|c: char| c == '?' || c == '#').next().unwrap_or("")
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    let want: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let got: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if got.len() > want.len() {
        return false;
    }
    want.iter().enumerate().all(|(i, w)| match got.get(i) {
        Some(g) => w.starts_with(':') || w == g,
        None => w.starts_with(':') && w.ends_with('?'),
    })
}

impl RouteTable {
    pub fn new() -> Self { Self::default() }

    pub fn page(mut self, pattern: &str, requires_auth: bool, roles: &[Role]) -> Self {
        self.routes.push(Route {
            pattern: pattern.to_string(),
            kind: RouteKind::Page { requires_auth, roles: roles.to_vec() },
        });
        self
    }

    pub fn redirect(mut self, pattern: &str, to: &str) -> Self {
        self.routes.push(Route { pattern: pattern.to_string(), kind: RouteKind::Redirect(to.to_string()) });
        self
    }

    /// The dashboard's route set.
    pub fn standard() -> Self {
        Self::new()
            .page(LOGIN_PATH, false, &[])
            .page("/gm/:view?", true, &[Role::Gm])
            .page("/manager/:view?", true, &[Role::Manager])
            .page("/employee/:view?", true, &[Role::Employee])
            .redirect("/", LOGIN_PATH)
    }

    /// First matching route; redirects are followed.
    pub fn resolve(&self, path: &str) -> Option<RouteTarget> {
        let mut path = normalize(path).to_string();
        for _ in 0..=self.routes.len() {
            let route = self.routes.iter().find(|r| pattern_matches(&r.pattern, &path))?;
            match &route.kind {
                RouteKind::Redirect(to) => path = to.clone(),
                RouteKind::Page { requires_auth, roles } => {
                    return Some(RouteTarget {
                        path,
                        requires_auth: *requires_auth,
                        roles: roles.iter().copied().collect(),
                    })
                }
            }
        }
        // redirect cycle
        None
    }
}
