use std::fmt;

use serde::{Deserialize, Serialize};

use crate::job::{JobResult, Request, Skills, Status};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    /// Result received and verified.
    ThanksABunch,
    /// Job capacity or result storage exhausted.
    Busy,
    /// Requested difficulty or payload exceeds what the node advertised.
    AreYouKidding,
    /// The search ran out of time.
    GaveUp,
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusCode::ThanksABunch => "thanks-a-bunch",
            StatusCode::Busy => "busy",
            StatusCode::AreYouKidding => "are-you-kidding",
            StatusCode::GaveUp => "gave-up",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolMessage {
    Skills(Skills),
    Status(Status),
    Request(Request),
    Result(JobResult),
}

impl ProtocolMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolMessage::Skills(_) => "skills",
            ProtocolMessage::Status(_) => "status",
            ProtocolMessage::Request(_) => "request",
            ProtocolMessage::Result(_) => "result",
        }
    }
}

impl From<Skills> for ProtocolMessage {
    fn from(msg: Skills) -> Self {
        ProtocolMessage::Skills(msg)
    }
}

impl From<Status> for ProtocolMessage {
    fn from(msg: Status) -> Self {
        ProtocolMessage::Status(msg)
    }
}

impl From<Request> for ProtocolMessage {
    fn from(msg: Request) -> Self {
        ProtocolMessage::Request(msg)
    }
}

impl From<JobResult> for ProtocolMessage {
    fn from(msg: JobResult) -> Self {
        ProtocolMessage::Result(msg)
    }
}
