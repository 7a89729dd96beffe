use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// デプロイ済みエージェント上のセッション
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,

    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, alias = "appName", skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,

    #[serde(default)]
    pub state: Map<String, Value>,

    /// セッション内のイベント（未加工のまま保持）
    #[serde(default)]
    pub events: Vec<Value>,

    #[serde(default, alias = "lastUpdateTime", skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<f64>,
}

/// `list_sessions` の応答
///
/// ランタイムのバージョンにより `{"sessions": [...]}` と配列のどちらでも返る。
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum SessionList {
    Wrapped { sessions: Vec<Session> },
    Bare(Vec<Session>),
}

impl From<SessionList> for Vec<Session> {
    fn from(list: SessionList) -> Self {
        match list {
            SessionList::Wrapped { sessions } => sessions,
            SessionList::Bare(sessions) => sessions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_session_record() {
        let session: Session = serde_json::from_value(json!({
            "id": "2961640358617825280",
            "userId": "user",
            "appName": "7014958003548553216",
            "state": {},
            "events": [],
            "lastUpdateTime": 1743683353.030133
        }))
        .unwrap();

        assert_eq!(session.id, "2961640358617825280");
        assert_eq!(session.user_id.as_deref(), Some("user"));
        assert!(session.events.is_empty());
    }

    #[test]
    fn test_session_list_shapes() {
        let wrapped: SessionList = serde_json::from_value(json!({
            "sessions": [{"id": "a"}, {"id": "b"}]
        }))
        .unwrap();
        let bare: SessionList = serde_json::from_value(json!([{"id": "a"}])).unwrap();

        assert_eq!(Vec::<Session>::from(wrapped).len(), 2);
        assert_eq!(Vec::<Session>::from(bare)[0].id, "a");
    }
}
