//! Decision report printed after a check, and the matching exit code.

use std::io::Write;

use minauth_core::{Decision, EventTag, RejectCause};
use serde::Serialize;

pub const EXIT_ACCEPTED: u8 = 0;
pub const EXIT_REJECTED: u8 = 1;
pub const EXIT_LOOKUP_FAILED: u8 = 2;
pub const EXIT_SETUP_FAILED: u8 = 3;

#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub minion_id: &'a str,
    pub tag: EventTag,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<&'static str>,
    pub detail: String,
}

impl<'a> Report<'a> {
    pub fn new(minion_id: &'a str, decision: &Decision) -> Self {
        let (cause, detail) = match decision {
            Decision::Accept { matched } => (
                None,
                format!(
                    "{}={} via {}",
                    matched.field, matched.value, matched.responder
                ),
            ),
            Decision::Reject { cause } => match cause {
                RejectCause::NotRegistered => {
                    (Some("not_registered"), "no CMDB server record".to_string())
                }
                RejectCause::InvalidMinionId(err) => (Some("invalid_minion_id"), err.to_string()),
                RejectCause::LookupFailed(err) => (Some("lookup_failed"), err.to_string()),
            },
        };
        Self {
            minion_id,
            tag: decision.tag(),
            accepted: decision.is_accepted(),
            cause,
            detail,
        }
    }

    pub fn human(&self) -> String {
        format!("{} {}: {}", self.tag, self.minion_id, self.detail)
    }
}

/// `0` accepted, `1` rejected, `2` rejected because the lookup itself failed.
pub fn exit_code(decision: &Decision) -> u8 {
    match decision {
        Decision::Accept { .. } => EXIT_ACCEPTED,
        Decision::Reject {
            cause: RejectCause::LookupFailed(_),
        } => EXIT_LOOKUP_FAILED,
        Decision::Reject { .. } => EXIT_REJECTED,
    }
}

pub fn write<W: Write + ?Sized>(
    out: &mut W,
    minion_id: &str,
    decision: &Decision,
    json: bool,
) -> anyhow::Result<()> {
    let report = Report::new(minion_id, decision);
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        writeln!(out, "{}", report.human())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use minauth_core::{AuthError, InvalidMinionId, RecordMatch};

    fn accepted() -> Decision {
        Decision::Accept {
            matched: RecordMatch {
                responder: "saltmaster".into(),
                field: "name".into(),
                value: "WEB01-PROD".into(),
            },
        }
    }

    #[test]
    fn accepted_report() {
        let decision = accepted();
        let report = Report::new("web01.corp.local", &decision);

        assert!(report.accepted);
        assert_eq!(
            report.human(),
            "AcceptMinion web01.corp.local: name=WEB01-PROD via saltmaster"
        );
        assert_eq!(exit_code(&decision), EXIT_ACCEPTED);
    }

    #[test]
    fn not_registered_report() {
        let decision = Decision::Reject {
            cause: RejectCause::NotRegistered,
        };
        let json = serde_json::to_value(Report::new("web02", &decision)).unwrap();

        assert_eq!(json["tag"], "RejectMinion");
        assert_eq!(json["accepted"], false);
        assert_eq!(json["cause"], "not_registered");
        assert_eq!(exit_code(&decision), EXIT_REJECTED);
    }

    #[test]
    fn lookup_failure_has_its_own_exit_code() {
        let decision = Decision::Reject {
            cause: RejectCause::LookupFailed(AuthError::Malformed("m: expected a list".into())),
        };
        let report = Report::new("web03", &decision);

        assert_eq!(report.cause, Some("lookup_failed"));
        assert!(report.detail.contains("expected a list"));
        assert_eq!(exit_code(&decision), EXIT_LOOKUP_FAILED);
    }

    #[test]
    fn invalid_id_counts_as_rejection() {
        let decision = Decision::Reject {
            cause: RejectCause::InvalidMinionId(InvalidMinionId(String::new())),
        };
        assert_eq!(exit_code(&decision), EXIT_REJECTED);
        assert_eq!(
            Report::new("", &decision).cause,
            Some("invalid_minion_id")
        );
    }

    #[test]
    fn writes_human_line() {
        let mut out = Vec::new();
        write(&mut out, "web01.corp.local", &accepted(), false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "AcceptMinion web01.corp.local: name=WEB01-PROD via saltmaster\n"
        );
    }

    #[test]
    fn accepted_json_omits_cause() {
        let json = serde_json::to_value(Report::new("web01", &accepted())).unwrap();
        assert!(json.get("cause").is_none());
        assert_eq!(json["accepted"], true);
    }
}
