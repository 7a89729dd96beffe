/// エージェント定義
///
/// ホスティング環境へ送る宣言的なエージェント記述。
/// 単一のLLMエージェント、またはサブエージェントを順に実行するシーケンシャル構成を表す。
use serde::{Deserialize, Serialize};

const NEWS_AGENT_INSTRUCTION: &str = "Focus on the requested topic and look for information in the news, focus on national sources. Always respond in spanish.";

/// エージェントに添付するツール
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    /// ホスト側の組み込み検索ツール
    GoogleSearch,
}

/// 生成パラメータ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateContentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// モデルを直接呼び出すエージェント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmAgent {
    pub name: String,
    pub description: String,
    pub model: String,
    pub instruction: String,
    #[serde(default)]
    pub generate_content_config: GenerateContentConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

/// サブエージェントを順番に実行する合成エージェント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequentialAgent {
    pub name: String,
    pub description: String,
    pub sub_agents: Vec<AgentDefinition>,
}

/// デプロイ対象となるエージェント記述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentDefinition {
    Llm(LlmAgent),
    Sequential(SequentialAgent),
}

impl AgentDefinition {
    pub fn name(&self) -> &str {
        match self {
            AgentDefinition::Llm(agent) => &agent.name,
            AgentDefinition::Sequential(agent) => &agent.name,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            AgentDefinition::Llm(agent) => &agent.description,
            AgentDefinition::Sequential(agent) => &agent.description,
        }
    }

    /// 直下のサブエージェント（LLMエージェントの場合は空）
    pub fn sub_agents(&self) -> &[AgentDefinition] {
        match self {
            AgentDefinition::Llm(_) => &[],
            AgentDefinition::Sequential(agent) => &agent.sub_agents,
        }
    }

    /// デプロイ用のJSONアーティファクトに変換する
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

/// ニュース検索を担当するサブエージェント
pub fn news_agent(model: &str) -> AgentDefinition {
    AgentDefinition::Llm(LlmAgent {
        name: "agent_news".to_string(),
        description: "Get news from Peruvian news agency".to_string(),
        model: model.to_string(),
        instruction: NEWS_AGENT_INSTRUCTION.to_string(),
        generate_content_config: GenerateContentConfig {
            temperature: Some(0.2),
        },
        tools: vec![Tool::GoogleSearch],
    })
}

/// ルートエージェント（スペイン語で親しみやすく話すブランドアシスタント）
pub fn corp_brand_agent(model: &str) -> AgentDefinition {
    AgentDefinition::Sequential(SequentialAgent {
        name: "agent_corp_brand".to_string(),
        description:
            "This agent acts as a friendly assistant always talks in Spanish in a friendly tone."
                .to_string(),
        sub_agents: vec![news_agent(model)],
    })
}
