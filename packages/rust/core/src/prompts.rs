//! Prompt text and response schemas for each AI-backed stage.

use serde_json::{Value, json};

use openkeywords_shared::CompanyContext;

const INTENTS: [&str; 5] = [
    "transactional",
    "commercial",
    "informational",
    "question",
    "comparison",
];

fn join_or_na(items: &[String], limit: usize) -> String {
    if items.is_empty() {
        "N/A".into()
    } else {
        items.iter().take(limit).cloned().collect::<Vec<_>>().join(", ")
    }
}

fn industry(ctx: &CompanyContext) -> &str {
    if ctx.industry.trim().is_empty() {
        "N/A"
    } else {
        &ctx.industry
    }
}

fn keyword_list(keywords: &[&str]) -> String {
    serde_json::to_string_pretty(keywords).unwrap_or_else(|_| "[]".into())
}

// ---------------------------------------------------------------------------
// Research
// ---------------------------------------------------------------------------

pub fn research_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "keywords": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "keyword": {"type": "string"},
                        "intent": {"type": "string", "enum": INTENTS},
                        "url": {"type": "string"},
                        "quote": {"type": "string"}
                    },
                    "required": ["keyword", "intent"]
                }
            }
        },
        "required": ["keywords"]
    })
}

/// Forum-style research: real threads where the audience describes problems.
pub fn research_forum(ctx: &CompanyContext, target: usize, today: &str) -> String {
    let services = join_or_na(&ctx.services, 3);
    let industry = industry(ctx);
    format!(
        "Today's date: {today}\n\n\
         Search Reddit and similar forums for discussions about: {industry}\n\
         Related services: {services}\n\n\
         Find {target} unique long-tail keywords and questions.\n\n\
         Search queries to use:\n\
         - site:reddit.com \"{industry} help\"\n\
         - site:reddit.com \"{industry} recommendation\"\n\
         - site:reddit.com \"{industry} vs\"\n\n\
         Extract real questions, problem descriptions, specific terminology and comparison phrases.\n\
         For each keyword capture the exact phrase, the full thread URL and a verbatim quote.\n\n\
         Return JSON with an array of keywords."
    )
}

/// Q&A-style research: question sites and "people also ask" boxes.
pub fn research_qa(ctx: &CompanyContext, target: usize, today: &str) -> String {
    let services = join_or_na(&ctx.services, 3);
    let industry = industry(ctx);
    format!(
        "Today's date: {today}\n\n\
         Search for questions about: {industry}\n\
         Related services: {services}\n\n\
         Find {target} unique questions and long-tail keywords.\n\n\
         Search queries:\n\
         - site:quora.com \"{industry}\"\n\
         - \"{industry}\" people also ask\n\
         - \"{services}\" how to\n\n\
         Extract actual questions, \"how to\" and \"best way to\" phrases, comparison questions and pain points.\n\
         For each keyword capture the exact question and the source URL.\n\n\
         Return JSON with an array of keywords."
    )
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

pub fn generation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "keywords": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "keyword": {"type": "string"},
                        "intent": {"type": "string", "enum": INTENTS},
                        "is_question": {"type": "boolean"}
                    },
                    "required": ["keyword", "intent"]
                }
            }
        },
        "required": ["keywords"]
    })
}

pub fn generation(ctx: &CompanyContext, target: usize) -> String {
    format!(
        "Generate {target} SEO keywords for this company:\n\n\
         COMPANY: {name}\n\
         INDUSTRY: {industry}\n\
         PRODUCTS: {products}\n\
         SERVICES: {services}\n\
         PAIN POINTS: {pain_points}\n\
         DIFFERENTIATORS: {differentiators}\n\
         TARGET REGION: {region}\n\
         LANGUAGE: {language}\n\n\
         REQUIREMENTS:\n\
         1. Spread keywords across intents: transactional (buy, pricing, demo), \
         commercial (alternatives, best), informational (how to, guide), \
         question (real questions users ask) and comparison (X vs Y).\n\
         2. Prefer long-tail keywords of 3-5 words, product-specific and problem-solving phrases.\n\
         3. Avoid generic industry terms, single-word keywords and near-duplicate variations.\n\n\
         Return JSON with an array of keywords, each with keyword, intent and is_question.",
        name = ctx.name,
        industry = industry(ctx),
        products = join_or_na(&ctx.products, 5),
        services = join_or_na(&ctx.services, 5),
        pain_points = join_or_na(&ctx.pain_points, 5),
        differentiators = join_or_na(&ctx.differentiators, 3),
        region = ctx.region.to_uppercase(),
        language = ctx.language,
    )
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

pub fn scoring_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "scores": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "keyword": {"type": "string"},
                        "score": {"type": "integer", "minimum": 0, "maximum": 100}
                    },
                    "required": ["keyword", "score"]
                }
            }
        },
        "required": ["scores"]
    })
}

pub fn scoring(ctx: &CompanyContext, keywords: &[&str]) -> String {
    format!(
        "Score these keywords for company-fit (0-100):\n\n\
         COMPANY: {name}\n\
         INDUSTRY: {industry}\n\
         PRODUCTS: {products}\n\
         SERVICES: {services}\n\
         PAIN POINTS: {pain_points}\n\n\
         SCORING CRITERIA:\n\
         - 80-100: directly matches company products or services\n\
         - 60-79: addresses core pain points or value proposition\n\
         - 40-59: broadly relevant to the industry\n\
         - 20-39: loosely related\n\
         - 0-19: irrelevant, too generic or wrong audience\n\n\
         KEYWORDS TO SCORE:\n{list}\n\n\
         Return JSON with a scores array of {{keyword, score}}, one entry per keyword, \
         with the keyword text copied exactly.",
        name = ctx.name,
        industry = industry(ctx),
        products = join_or_na(&ctx.products, 5),
        services = join_or_na(&ctx.services, 5),
        pain_points = join_or_na(&ctx.pain_points, 3),
        list = keyword_list(keywords),
    )
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

pub fn clustering_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "clusters": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "keywords": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["name", "keywords"]
                }
            }
        },
        "required": ["clusters"]
    })
}

pub fn clustering(ctx: &CompanyContext, keywords: &[&str], cluster_count: usize) -> String {
    format!(
        "Group these keywords into {cluster_count} semantic clusters for {name}:\n\n\
         INDUSTRY: {industry}\n\n\
         KEYWORDS:\n{list}\n\n\
         CLUSTERING RULES:\n\
         1. Create exactly {cluster_count} clusters\n\
         2. Give each cluster a short descriptive name of 2-4 words\n\
         3. Group by semantic similarity and topic\n\
         4. Every keyword must belong to exactly one cluster, copied exactly\n\
         5. Keep cluster sizes roughly balanced\n\n\
         Return JSON with a clusters array, each containing name and keywords.",
        name = ctx.name,
        industry = industry(ctx),
        list = keyword_list(keywords),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> CompanyContext {
        CompanyContext {
            name: "Acme".into(),
            industry: "B2B SaaS".into(),
            products: (1..=7).map(|i| format!("product {i}")).collect(),
            pain_points: vec!["slow onboarding".into()],
            ..Default::default()
        }
    }

    #[test]
    fn generation_caps_products_at_five() {
        let prompt = generation(&ctx(), 30);
        assert!(prompt.contains("Generate 30 SEO keywords"));
        assert!(prompt.contains("product 5"));
        assert!(!prompt.contains("product 6"));
        assert!(prompt.contains("SERVICES: N/A"));
        assert!(prompt.contains("TARGET REGION: US"));
    }

    #[test]
    fn scoring_prompt_embeds_keyword_list() {
        let prompt = scoring(&ctx(), &["crm for dentists", "what is a crm"]);
        assert!(prompt.contains("\"crm for dentists\""));
        assert!(prompt.contains("PAIN POINTS: slow onboarding"));
    }

    #[test]
    fn schemas_require_top_level_arrays() {
        assert_eq!(scoring_schema()["required"][0], "scores");
        assert_eq!(clustering_schema()["required"][0], "clusters");
        assert_eq!(generation_schema()["properties"]["keywords"]["type"], "array");
    }
}
