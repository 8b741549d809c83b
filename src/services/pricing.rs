//! 模型计费
//!
//! 按 Gemini 官方价目表计算单轮成本。Pro 系列按 20 万 token
//! 分档计价（整笔按所在档位费率结算），Flash 系列为统一费率。

/// 分档阈值（token 数）
pub const TIER_THRESHOLD: u64 = 200_000;

/// 单模型价目（美元 / 百万 token）
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_low: f64,
    pub input_high: f64,
    pub cache_hit_low: f64,
    pub cache_hit_high: f64,
    pub output_low: f64,
    pub output_high: f64,
}

static PRICING: phf::Map<&'static str, ModelPricing> = phf::phf_map! {
    "gemini-3-pro-preview" => ModelPricing {
        input_low: 2.00,
        input_high: 4.00,
        cache_hit_low: 0.20,
        cache_hit_high: 0.40,
        output_low: 12.00,
        output_high: 18.00,
    },
    "gemini-3-flash-preview" => ModelPricing {
        input_low: 0.50,
        input_high: 0.50,
        cache_hit_low: 0.05,
        cache_hit_high: 0.05,
        output_low: 3.00,
        output_high: 3.00,
    },
};

/// 整笔按档位费率计价：不超过阈值走低档，否则全部按高档
fn tiered(count: u64, low: f64, high: f64) -> f64 {
    let rate = if count <= TIER_THRESHOLD { low } else { high };
    count as f64 / 1_000_000.0 * rate
}

/// 计算单轮调用成本（美元）
///
/// 缓存部分的 token 在缓存创建（或过期重建）的那一轮按输入价计费，
/// 之后的轮次按缓存命中价计费。未知模型返回 0。
pub fn calculate_cost(
    cached_tokens: u64,
    non_cached_tokens: u64,
    output_tokens: u64,
    model_name: &str,
    is_cache_creation: bool,
) -> f64 {
    let Some((_, pricing)) = PRICING
        .entries()
        .find(|(key, _)| model_name.contains(*key))
    else {
        tracing::warn!("未知模型 '{}'，本轮成本记为 0", model_name);
        return 0.0;
    };

    let cached_cost = if is_cache_creation {
        tiered(cached_tokens, pricing.input_low, pricing.input_high)
    } else {
        tiered(cached_tokens, pricing.cache_hit_low, pricing.cache_hit_high)
    };
    let input_cost = tiered(non_cached_tokens, pricing.input_low, pricing.input_high);
    let output_cost = tiered(output_tokens, pricing.output_low, pricing.output_high);

    cached_cost + input_cost + output_cost
}
