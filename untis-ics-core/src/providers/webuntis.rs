//! WebUntis JSON-RPC client.
//!
//! One fetch is a full session: `authenticate`, resolve whose timetable to
//! read, `getTimetable` over the configured window, then `logout`.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use reqwest::{Url, header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;

use crate::{
    Error, FetchWindow, LessonStatus, RawLessonRecord, Result,
    config::{SyncConfig, TimetableTarget},
    providers::{BaseProvider, BaseProviderBuilder, ProviderInfo, TimetableSource},
    timezone,
};

const CLIENT_NAME: &str = "untis-ics";
const RPC_ID: &str = "untis-ics";

/// `type` of a timetable element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Class,
    Student,
}

impl ElementType {
    pub const fn code(self) -> u8 {
        match self {
            Self::Class => 1,
            Self::Student => 5,
        }
    }

    fn from_person_type(code: i64) -> Option<Self> {
        (code == 5).then_some(Self::Student)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimetableElement {
    pub id: i64,
    pub kind: ElementType,
}

#[derive(Debug, Clone)]
pub struct Session {
    session_id: String,
    person: Option<TimetableElement>,
}

#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    id: &'a str,
    method: &'a str,
    params: P,
    jsonrpc: &'a str,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResult {
    session_id: String,
    #[serde(default)]
    person_type: Option<i64>,
    #[serde(default)]
    person_id: Option<i64>,
}

/// A class or student as listed by `getKlassen`/`getStudents`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UntisElement {
    pub id: i64,
    pub name: String,
    #[serde(default, alias = "longName")]
    pub longname: Option<String>,
}

/// Reference to a subject, teacher, room or class inside a period
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeriodRef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub longname: Option<String>,
    /// Set when the original element was replaced for this occurrence
    #[serde(default)]
    pub orgid: Option<i64>,
}

impl PeriodRef {
    fn display_name(&self) -> Option<&str> {
        [self.longname.as_deref(), self.name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

/// One entry of a `getTimetable` response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    #[serde(default)]
    pub id: Option<i64>,
    /// `yyyymmdd`
    #[serde(default)]
    pub date: Option<u32>,
    /// `hmm`
    #[serde(default)]
    pub start_time: Option<u32>,
    #[serde(default)]
    pub end_time: Option<u32>,
    #[serde(default)]
    pub kl: Vec<PeriodRef>,
    #[serde(default)]
    pub te: Vec<PeriodRef>,
    #[serde(default)]
    pub su: Vec<PeriodRef>,
    #[serde(default)]
    pub ro: Vec<PeriodRef>,
    #[serde(default)]
    pub lstype: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub subst_text: Option<String>,
    #[serde(default)]
    pub lstext: Option<String>,
}

pub struct WebUntisProvider {
    base: BaseProvider,
    endpoint: Url,
    config: SyncConfig,
    tz: Tz,
}

impl WebUntisProvider {
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let base = BaseProviderBuilder::new(ProviderInfo {
            name: "webuntis".to_string(),
            description: format!("WebUntis timetable of {} on {}", config.school, config.server),
        })
        .build()?;
        let endpoint = rpc_endpoint(&config.server, &config.school)?;
        let tz = config.tz()?;

        Ok(Self {
            base,
            endpoint,
            config,
            tz,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    async fn call<P, T>(&self, session: Option<&Session>, method: &str, params: P) -> Result<T>
    where
        P: Serialize + Send,
        T: DeserializeOwned,
    {
        let mut request = self.base.client.post(self.endpoint.clone()).json(&RpcRequest {
            id: RPC_ID,
            method,
            params,
            jsonrpc: "2.0",
        });
        if let Some(session) = session {
            request = request.header(
                header::COOKIE,
                format!("JSESSIONID={}", session.session_id),
            );
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.base.handle_error_req(e))?;

        if !response.status().is_success() {
            return Err(self
                .base
                .custom_error(format!("HTTP {} error on {}", response.status(), method)));
        }

        let payload: RpcResponse<T> = response.json().await.map_err(|e| {
            self.base
                .custom_error(format!("Failed to parse {} response: {}", method, e))
        })?;

        if let Some(error) = payload.error {
            tracing::debug!("{} returned error {:?}", method, error);
            return Err(if method == "authenticate" {
                Error::Authentication(format!("{}: {}", self.base.info.name, error.message))
            } else {
                self.base
                    .custom_error(format!("{} failed: {}", method, error.message))
            });
        }

        match payload.result {
            Some(result) => Ok(result),
            // `logout` answers with a null result
            None => serde_json::from_value(serde_json::Value::Null).map_err(|_| {
                self.base
                    .custom_error(format!("{} returned no result", method))
            }),
        }
    }

    pub async fn authenticate(&self) -> Result<Session> {
        let auth: AuthResult = self
            .call(
                None,
                "authenticate",
                json!({
                    "user": self.config.username,
                    "password": self.config.password,
                    "client": CLIENT_NAME,
                }),
            )
            .await?;

        let person = match (auth.person_type.and_then(ElementType::from_person_type), auth.person_id) {
            (Some(kind), Some(id)) if id > 0 => Some(TimetableElement { id, kind }),
            _ => None,
        };
        tracing::debug!("Authenticated as {}", self.config.username);

        Ok(Session {
            session_id: auth.session_id,
            person,
        })
    }

    pub async fn logout(&self, session: &Session) -> Result<()> {
        let _: serde_json::Value = self.call(Some(session), "logout", json!({})).await?;
        Ok(())
    }

    async fn logout_quietly(&self, session: &Session) {
        if let Err(e) = self.logout(session).await {
            tracing::warn!("Logout failed: {}", e);
        }
    }

    pub async fn classes(&self, session: &Session) -> Result<Vec<UntisElement>> {
        self.call(Some(session), "getKlassen", json!({})).await
    }

    pub async fn students(&self, session: &Session) -> Result<Vec<UntisElement>> {
        self.call(Some(session), "getStudents", json!({})).await
    }

    /// List the school's classes in a session of their own.
    pub async fn list_classes(&self) -> Result<Vec<UntisElement>> {
        let session = self.authenticate().await?;
        let result = self.classes(&session).await;
        self.logout_quietly(&session).await;
        result
    }

    pub async fn resolve_target(&self, session: &Session) -> Result<TimetableElement> {
        match self.config.target() {
            TimetableTarget::Class(id) => Ok(TimetableElement {
                id,
                kind: ElementType::Class,
            }),
            TimetableTarget::Student(id) => Ok(TimetableElement {
                id,
                kind: ElementType::Student,
            }),
            TimetableTarget::ClassNamed(pattern) => {
                let classes = self.classes(session).await?;
                find_class(&classes, &pattern)
                    .map(|class| TimetableElement {
                        id: class.id,
                        kind: ElementType::Class,
                    })
                    .ok_or_else(|| {
                        self.base
                            .custom_error(format!("No class matches {:?}", pattern))
                    })
            }
            TimetableTarget::Auto => {
                if let Some(person) = session.person {
                    return Ok(person);
                }
                if let Some(class) = self.classes(session).await?.first() {
                    tracing::info!("No target configured, using class {}", class.name);
                    return Ok(TimetableElement {
                        id: class.id,
                        kind: ElementType::Class,
                    });
                }
                let student = self.students(session).await?.into_iter().next().ok_or_else(|| {
                    self.base
                        .custom_error("Could not find a class or student timetable")
                })?;
                tracing::info!("No target configured, using student {}", student.name);
                Ok(TimetableElement {
                    id: student.id,
                    kind: ElementType::Student,
                })
            }
        }
    }

    pub async fn timetable(
        &self,
        session: &Session,
        element: TimetableElement,
        window: &FetchWindow,
    ) -> Result<Vec<Period>> {
        self.call(
            Some(session),
            "getTimetable",
            json!({
                "options": {
                    "element": { "id": element.id, "type": element.kind.code() },
                    "startDate": untis_date(window.start),
                    "endDate": untis_date(window.end),
                    "showInfo": true,
                    "showSubstText": true,
                    "showLsText": true,
                    "showLsNumber": true,
                    "showStudentgroup": true,
                    "klasseFields": ["id", "name", "longname"],
                    "roomFields": ["id", "name", "longname"],
                    "subjectFields": ["id", "name", "longname"],
                    "teacherFields": ["id", "name", "longname"],
                }
            }),
        )
        .await
    }

    async fn fetch_in_session(&self, session: &Session) -> Result<Vec<Period>> {
        let element = self.resolve_target(session).await?;
        let today = Utc::now().with_timezone(&self.tz).date_naive();
        let window = self.config.fetch_window(today);
        tracing::info!(
            "Fetching timetable for {:?} {} from {} to {}",
            element.kind,
            element.id,
            window.start,
            window.end
        );
        self.timetable(session, element, &window).await
    }
}

#[async_trait]
impl TimetableSource for WebUntisProvider {
    fn name(&self) -> &str {
        &self.base.info.name
    }

    fn description(&self) -> &str {
        &self.base.info.description
    }

    async fn fetch_records(&self) -> Result<Vec<RawLessonRecord>> {
        let session = self.authenticate().await?;
        let periods = self.fetch_in_session(&session).await;
        self.logout_quietly(&session).await;

        let periods = periods?;
        tracing::info!("Received {} periods", periods.len());
        Ok(periods
            .iter()
            .map(|period| period_to_record(period, self.tz))
            .collect())
    }

    async fn validate(&self) -> Result<()> {
        let session = self.authenticate().await?;
        self.logout(&session).await
    }
}

fn rpc_endpoint(server: &str, school: &str) -> Result<Url> {
    let host = server
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let mut url = Url::parse(&format!("https://{host}/WebUntis/jsonrpc.do"))
        .map_err(|e| Error::Config(format!("Invalid server {:?}: {}", server, e)))?;
    url.query_pairs_mut().append_pair("school", school);
    Ok(url)
}

fn find_class<'a>(classes: &'a [UntisElement], pattern: &str) -> Option<&'a UntisElement> {
    let pattern = pattern.to_lowercase();
    classes.iter().find(|class| {
        class.name.to_lowercase().contains(&pattern)
            || class
                .longname
                .as_deref()
                .is_some_and(|l| l.to_lowercase().contains(&pattern))
    })
}

fn untis_date(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 10_000 + i64::from(date.month()) * 100 + i64::from(date.day())
}

fn parse_untis_date(value: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt((value / 10000) as i32, (value / 100) % 100, value % 100)
}

fn parse_untis_time(value: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(value / 100, value % 100, 0)
}

/// Map WebUntis period codes onto a lesson status.
pub fn classify(period: &Period) -> LessonStatus {
    match period.code.as_deref() {
        Some("cancelled") => LessonStatus::Cancelled,
        _ if period.lstype.as_deref() == Some("ex") => LessonStatus::Exam,
        Some("irregular") if period.ro.iter().any(|r| r.orgid.is_some()) => LessonStatus::Moved,
        Some("irregular") => LessonStatus::Substituted,
        _ => LessonStatus::Regular,
    }
}

/// Convert a period into a raw record.
///
/// Dates or times that cannot be placed in `tz` leave `start`/`end` unset,
/// which the normalizer reports as a rejected record.
pub fn period_to_record(period: &Period, tz: Tz) -> RawLessonRecord {
    let date = period.date.and_then(parse_untis_date);
    let instant = |time: Option<u32>| {
        let naive = date?.and_time(parse_untis_time(time?)?);
        timezone::localize(tz, naive).map(|dt| dt.fixed_offset())
    };
    let names = |refs: &[PeriodRef]| -> Vec<String> {
        refs.iter()
            .filter_map(PeriodRef::display_name)
            .map(str::to_string)
            .collect()
    };
    let text = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let subjects = names(&period.su);
    RawLessonRecord {
        remote_id: period.id.map(|id| id.to_string()),
        subject: (!subjects.is_empty()).then(|| subjects.join(", ")),
        rooms: names(&period.ro),
        teachers: names(&period.te),
        classes: names(&period.kl),
        start: instant(period.start_time),
        end: instant(period.end_time),
        status: Some(classify(period).as_str().to_string()),
        substitution_note: text(&period.subst_text),
        info: text(&period.info).or_else(|| text(&period.lstext)),
    }
}
