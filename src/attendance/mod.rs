//!
//! timeclock attendance
//! --------------------
//! Clock-in, clock-out and break actions for the signed-in user, plus the derived
//! figures the dashboards show (today's log, weekly and monthly hours, recent
//! days). Logs are cached locally and re-read from the backend after every
//! action; a failed re-read keeps what was cached before.
//!
//! The backend does not deduplicate, so the client refuses a second clock-in for
//! the same day and refuses any action while another one is in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};
use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::api::{ApiGateway, ApiResponse};
use crate::error::{AppError, AppResult};
use crate::identity::{Role, SessionManager, User};

pub mod model;

pub use model::{format_timestamp, parse_timestamp, LogStatus, TimeLog, WorkingTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClockAction {
    Out,
    BreakStart,
    BreakEnd,
}

impl ClockAction {
    fn field(self) -> &'static str {
        match self {
            ClockAction::Out => "end_time",
            ClockAction::BreakStart => "break_start",
            ClockAction::BreakEnd => "break_end",
        }
    }

    fn eligible(self, log: &TimeLog) -> bool {
        log.is_open()
            && match self {
                ClockAction::Out => true,
                ClockAction::BreakStart => !log.on_break(),
                ClockAction::BreakEnd => log.on_break(),
            }
    }

    fn not_found(self) -> &'static str {
        match self {
            ClockAction::Out => "No active clock-in session found",
            ClockAction::BreakStart => "No active clock-in session found or break already active",
            ClockAction::BreakEnd => "No active break found to end",
        }
    }
}

struct ActionGuard<'a>(&'a AtomicBool);

impl<'a> ActionGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> AppResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ActionGuard(flag))
            .map_err(|_| AppError::conflict("action_in_flight", "another clock action is in progress"))
    }
}

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

pub struct AttendanceClient {
    gateway: Arc<ApiGateway>,
    session: SessionManager,
    logs: RwLock<Vec<TimeLog>>,
    directory: RwLock<Vec<User>>,
    in_flight: AtomicBool,
}

fn today() -> NaiveDate { Local::now().date_naive() }

fn now() -> NaiveDateTime { Local::now().naive_local() }

impl AttendanceClient {
    pub fn new(gateway: Arc<ApiGateway>, session: SessionManager) -> Self {
        Self {
            gateway,
            session,
            logs: RwLock::new(Vec::new()),
            directory: RwLock::new(Vec::new()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn logs(&self) -> Vec<TimeLog> { self.logs.read().clone() }

    pub fn directory(&self) -> Vec<User> { self.directory.read().clone() }

    fn current_user(&self) -> AppResult<User> {
        let snap = self.session.snapshot();
        match snap.user {
            Some(u) if snap.is_authenticated => Ok(u),
            _ => Err(AppError::auth("not_authenticated", "No user logged in")),
        }
    }

    /// Signed-in user, after making sure the access token is still usable.
    async fn signed_in_user(&self) -> AppResult<User> {
        self.session.fresh_access_token().await?;
        self.current_user()
    }

    /// Load the user directory used for team filtering. Entries that do not
    /// parse are skipped; the signed-in user is always present.
    pub async fn load_users(&self) -> AppResult<usize> {
        let resp = self.gateway.get_users(&[]).await?;
        let mut users: Vec<User> = match resp.data().and_then(|d| d.as_array()) {
            Some(items) => items
                .iter()
                .filter_map(|v| match User::from_json(v) {
                    Ok(u) => Some(u),
                    Err(e) => {
                        debug!(target: "timeclock::attendance", "skipping directory entry: {}", e);
                        None
                    }
                })
                .collect(),
            None => Vec::new(),
        };
        if let Ok(me) = self.current_user() {
            if !users.iter().any(|u| u.id == me.id) {
                users.push(me);
            }
        }
        let n = users.len();
        *self.directory.write() = users;
        Ok(n)
    }

    fn visible(&self, me: &User, records: Vec<WorkingTime>) -> Vec<WorkingTime> {
        match me.role {
            Role::Gm => records,
            Role::Employee => records.into_iter().filter(|wt| wt.user_id == me.id).collect(),
            Role::Manager => {
                let dir = self.directory.read();
                records
                    .into_iter()
                    .filter(|wt| {
                        wt.user_id == me.id
                            || dir.iter().any(|u| u.id == wt.user_id && u.role == Role::Employee)
                    })
                    .collect()
            }
        }
    }

    /// Re-read working times. Failures are logged and the cached logs kept.
    /// Returns the number of cached logs afterwards.
    pub async fn refresh_working_times(&self) -> usize {
        let me = match self.signed_in_user().await {
            Ok(me) => me,
            Err(e) => {
                debug!(target: "timeclock::attendance", "not refreshing working times: {}", e);
                return self.logs.read().len();
            }
        };
        let resp = match self.gateway.get_working_times(&[]).await {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "timeclock::attendance", "could not load working times, keeping cached logs: {}", e);
                return self.logs.read().len();
            }
        };
        let Some(items) = resp.data().and_then(|d| d.as_array()) else {
            warn!(target: "timeclock::attendance", "working times response has no data array, keeping cached logs");
            return self.logs.read().len();
        };
        let records: Vec<WorkingTime> = items
            .iter()
            .filter_map(|v| serde_json::from_value::<WorkingTime>(v.clone()).ok())
            .collect();
        let logs: Vec<TimeLog> = self
            .visible(&me, records)
            .iter()
            .filter_map(TimeLog::from_working_time)
            .collect();
        debug!(target: "timeclock::attendance", "{} working times visible to {} ({:?})", logs.len(), me.id, resp.source);
        let n = logs.len();
        *self.logs.write() = logs;
        n
    }

    pub async fn clock_in(&self, user_initiated: bool) -> AppResult<ApiResponse> {
        self.clock_in_at(user_initiated, now()).await
    }

    /// Clock in at `now`. Refused unless user-initiated, and when today already
    /// has an active log.
    pub async fn clock_in_at(&self, user_initiated: bool, now: NaiveDateTime) -> AppResult<ApiResponse> {
        if !user_initiated {
            warn!(target: "timeclock::attendance", "clock-in without user initiation blocked");
            return Err(AppError::user("not_user_initiated", "clock-in must be user initiated"));
        }
        let me = self.signed_in_user().await?;
        let day = now.date();
        let already = self
            .logs
            .read()
            .iter()
            .any(|l| l.user_id == me.id && l.date == day && l.is_active());
        if already {
            return Err(AppError::conflict("already_clocked_in", "Already clocked in for today"));
        }
        let _guard = ActionGuard::acquire(&self.in_flight)?;
        let body = json!({
            "user_id": me.id,
            "start_time": format_timestamp(now),
            "date": day.format("%Y-%m-%d").to_string(),
        });
        let resp = self.gateway.create_working_time(&body).await?;
        info!(target: "timeclock::attendance", "clocked in user={} ({:?})", me.id, resp.source);
        self.refresh_working_times().await;
        Ok(resp)
    }

    pub async fn clock_out(&self) -> AppResult<ApiResponse> { self.clock_out_at(now()).await }

    pub async fn clock_out_at(&self, now: NaiveDateTime) -> AppResult<ApiResponse> {
        self.stamp(ClockAction::Out, now).await
    }

    pub async fn start_break(&self) -> AppResult<ApiResponse> { self.start_break_at(now()).await }

    pub async fn start_break_at(&self, now: NaiveDateTime) -> AppResult<ApiResponse> {
        self.stamp(ClockAction::BreakStart, now).await
    }

    pub async fn end_break(&self) -> AppResult<ApiResponse> { self.end_break_at(now()).await }

    pub async fn end_break_at(&self, now: NaiveDateTime) -> AppResult<ApiResponse> {
        self.stamp(ClockAction::BreakEnd, now).await
    }

    async fn stamp(&self, action: ClockAction, now: NaiveDateTime) -> AppResult<ApiResponse> {
        let me = self.signed_in_user().await?;
        let _guard = ActionGuard::acquire(&self.in_flight)?;
        let day = now.date();
        let target = self
            .logs
            .read()
            .iter()
            .filter(|l| l.user_id == me.id && l.date == day && action.eligible(l))
            .max_by_key(|l| l.clock_in)
            .map(|l| l.id.clone());
        let Some(id) = target else {
            return Err(AppError::user("no_active_session", action.not_found()));
        };
        let mut body = serde_json::Map::new();
        body.insert(action.field().to_string(), json!(format_timestamp(now)));
        let resp = self.gateway.update_working_time(&id, &serde_json::Value::Object(body)).await?;
        info!(target: "timeclock::attendance", "{} recorded on working time {} ({:?})", action.field(), id, resp.source);
        self.refresh_working_times().await;
        Ok(resp)
    }

    fn my_logs(&self) -> Option<(String, Vec<TimeLog>)> {
        let me = self.current_user().ok()?;
        Some((me.id, self.logs()))
    }

    pub fn todays_log(&self) -> Option<TimeLog> { self.todays_log_on(today()) }

    pub fn todays_log_on(&self, day: NaiveDate) -> Option<TimeLog> {
        let (id, logs) = self.my_logs()?;
        model::todays_log(&logs, &id, day).cloned()
    }

    pub fn weekly_hours(&self) -> f64 { self.weekly_hours_on(today()) }

    pub fn weekly_hours_on(&self, day: NaiveDate) -> f64 {
        self.my_logs()
            .map(|(id, logs)| model::hours_since(&logs, &id, model::week_start(day)))
            .unwrap_or(0.0)
    }

    pub fn monthly_hours(&self) -> f64 { self.monthly_hours_on(today()) }

    pub fn monthly_hours_on(&self, day: NaiveDate) -> f64 {
        self.my_logs()
            .map(|(id, logs)| model::hours_since(&logs, &id, model::month_start(day)))
            .unwrap_or(0.0)
    }

    pub fn recent_logs(&self) -> Vec<TimeLog> { self.recent_logs_on(today()) }

    pub fn recent_logs_on(&self, day: NaiveDate) -> Vec<TimeLog> {
        self.my_logs()
            .map(|(id, logs)| model::recent_logs(&logs, &id, day))
            .unwrap_or_default()
    }
}
