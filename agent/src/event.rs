/// ストリーミング応答のイベントと、その内容の分類
///
/// イベントは受信時に一度だけ型付きの構造へデコードする。
/// 不正な構造はエラーにせず、`Part::Unknown` または空の結果に縮退させる。
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::fmt;
use std::io::Write;

const SEPARATOR: &str = "-----------------------------";
const WIDE_SEPARATOR: &str = "------------------------------";

/// ツール呼び出し要求
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Option<Value>,
    /// 受信したままのオブジェクト（`id` などもそのまま残る）
    pub raw: Value,
}

impl FunctionCall {
    /// `name` が文字列でない場合は None
    fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.to_string();
        Some(Self {
            name,
            args: value.get("args").cloned(),
            raw: value.clone(),
        })
    }
}

/// ツール呼び出し結果
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Option<Value>,
    pub raw: Value,
}

impl FunctionResponse {
    fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.to_string();
        Some(Self {
            name,
            response: value.get("response").cloned(),
            raw: value.clone(),
        })
    }
}

/// イベント内容の最小単位
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
    /// 認識できない構造（元の値をそのまま保持）
    Unknown(Value),
}

impl Part {
    /// JSON値からパートをデコードする
    ///
    /// `text` → `function_call` → `function_response` の優先順でキーを調べる。
    /// `text` が null の場合はキーがないものとみなす。
    /// キーは存在するが値の形が不正な場合は `Unknown` になる。
    pub fn from_value(value: Value) -> Self {
        let Some(object) = value.as_object() else {
            return Part::Unknown(value);
        };

        match object.get("text") {
            Some(Value::String(text)) => return Part::Text(text.clone()),
            Some(Value::Null) | None => {}
            Some(_) => return Part::Unknown(value),
        }

        if let Some(call) = lookup(object, "function_call", "functionCall") {
            return match FunctionCall::from_value(call) {
                Some(call) => Part::FunctionCall(call),
                None => Part::Unknown(value),
            };
        }

        if let Some(response) = lookup(object, "function_response", "functionResponse") {
            return match FunctionResponse::from_value(response) {
                Some(response) => Part::FunctionResponse(response),
                None => Part::Unknown(value),
            };
        }

        Part::Unknown(value)
    }

    pub fn kind(&self) -> PartKind {
        match self {
            Part::Text(_) => PartKind::Text,
            Part::FunctionCall(_) => PartKind::FunctionCall,
            Part::FunctionResponse(_) => PartKind::FunctionResponse,
            Part::Unknown(_) => PartKind::Unknown,
        }
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Part::from_value)
    }
}

/// REST 経由では camelCase のキーで届くことがあるため両方を受け付ける
fn lookup<'a>(object: &'a Map<String, Value>, snake: &str, camel: &str) -> Option<&'a Value> {
    object.get(snake).or_else(|| object.get(camel))
}

/// イベントの内容
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Content {
    pub role: Option<String>,
    /// `parts` が配列でない場合は None
    pub parts: Option<Vec<Part>>,
}

impl Content {
    fn from_object(object: &Map<String, Value>) -> Self {
        let role = object
            .get("role")
            .and_then(Value::as_str)
            .map(str::to_string);
        let parts = object.get("parts").and_then(Value::as_array).map(|parts| {
            parts
                .iter()
                .cloned()
                .map(Part::from_value)
                .collect::<Vec<_>>()
        });
        Self { role, parts }
    }
}

/// ストリーミング応答の1イベント
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    pub id: Option<String>,
    pub author: Option<String>,
    pub invocation_id: Option<String>,
    pub timestamp: Option<f64>,
    /// `content` がオブジェクトでない場合は None
    pub content: Option<Content>,
}

impl Event {
    /// JSON値からイベントをデコードする（失敗しない）
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Event::default();
        };

        let string = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);

        Self {
            id: string("id"),
            author: string("author"),
            invocation_id: string("invocation_id").or_else(|| string("invocationId")),
            timestamp: object.get("timestamp").and_then(Value::as_f64),
            content: object
                .get("content")
                .and_then(Value::as_object)
                .map(Content::from_object),
        }
    }

    /// 内容のパート一覧（存在しない場合は空）
    pub fn parts(&self) -> &[Part] {
        self.content
            .as_ref()
            .and_then(|content| content.parts.as_deref())
            .unwrap_or(&[])
    }
}

impl From<Value> for Event {
    fn from(value: Value) -> Self {
        Event::from_value(&value)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Event::from)
    }
}

/// 分類の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    Text,
    FunctionCall,
    FunctionResponse,
    Unknown,
}

impl PartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartKind::Text => "text",
            PartKind::FunctionCall => "function_call",
            PartKind::FunctionResponse => "function_response",
            PartKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分類結果（種類とペイロードの組）
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedItem {
    pub kind: PartKind,
    pub payload: Value,
}

impl ClassifiedItem {
    pub fn new(kind: PartKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    fn name(&self) -> &str {
        self.payload
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn field(&self, key: &str) -> &Value {
        self.payload.get(key).unwrap_or(&Value::Null)
    }
}

impl From<&Part> for ClassifiedItem {
    fn from(part: &Part) -> Self {
        let payload = match part {
            Part::Text(text) => Value::String(text.clone()),
            Part::FunctionCall(call) => call.raw.clone(),
            Part::FunctionResponse(response) => response.raw.clone(),
            Part::Unknown(value) => value.clone(),
        };
        ClassifiedItem::new(part.kind(), payload)
    }
}

/// 種類ごとのバナー付きで人間向けに表示する
impl fmt::Display for ClassifiedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            PartKind::Text => {
                writeln!(f, "{}", SEPARATOR)?;
                writeln!(f, ">>> Inside final response <<<")?;
                writeln!(f, "{}", SEPARATOR)?;
                match self.payload.as_str() {
                    Some(text) => write!(f, "{}", text),
                    None => write!(f, "{}", self.payload),
                }
            }
            PartKind::FunctionCall => {
                writeln!(f, "{}", SEPARATOR)?;
                writeln!(f, "+++ Inside function call +++")?;
                writeln!(f, "{}", SEPARATOR)?;
                writeln!(f, "Call Function: {}", self.name())?;
                write!(f, "Argument: {}", self.field("args"))
            }
            PartKind::FunctionResponse => {
                writeln!(f, "{}", WIDE_SEPARATOR)?;
                writeln!(f, "-- Inside function response --")?;
                writeln!(f, "{}", WIDE_SEPARATOR)?;
                writeln!(f, "Function Response: {}", self.name())?;
                write!(f, "Response: {}", self.field("response"))
            }
            PartKind::Unknown => write!(f, "Unknown part: {}", self.payload),
        }
    }
}

/// イベントのパートを順番どおりに分類する
///
/// `content` または `parts` がない場合は空のベクターを返す。
pub fn classify_event(event: &Event) -> Vec<ClassifiedItem> {
    event.parts().iter().map(ClassifiedItem::from).collect()
}

/// イベントを分類し、各結果をバナー付きで `out` に書き出す
///
/// # Arguments
/// * `event` - 分類するイベント
/// * `out` - 表示先（通常は標準出力）
///
/// # Returns
/// 分類結果。書き込みに失敗しても結果は返す。
pub fn parse_event_content<W: Write>(event: &Event, out: &mut W) -> Vec<ClassifiedItem> {
    let items = classify_event(event);
    for item in &items {
        tracing::debug!(kind = %item.kind, author = ?event.author, "classified event part");
        let _ = writeln!(out, "{}", item);
    }
    let _ = out.flush();
    items
}
