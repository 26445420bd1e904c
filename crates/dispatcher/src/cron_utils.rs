use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Duration, Timelike, Utc};
use cron::Schedule;
use tracing::{debug, warn};

use taskhub_core::{CrontabSpec, SchedulerError, SchedulerResult};

/// CRON表达式解析和调度工具
pub struct CronScheduler {
    schedule: Schedule,
}

impl CronScheduler {
    /// 创建新的CRON调度器，表达式使用 cron crate 的六段格式（含秒）
    pub fn new(cron_expr: &str) -> SchedulerResult<Self> {
        let schedule = Schedule::from_str(cron_expr)
            .map_err(|e| SchedulerError::invalid_cron(cron_expr, e.to_string()))?;

        Ok(Self { schedule })
    }

    /// 由周期调度器风格的 crontab 字段创建
    pub fn from_crontab(spec: &CrontabSpec) -> SchedulerResult<Self> {
        Self::new(&crontab_to_cron_expression(spec)?)
    }

    /// 获取不早于 `at` 的第一次执行时间
    pub fn first_at_or_after(&self, at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        // 触发点都在整秒上：带小数秒时从向下取整的整秒之后开始找即可
        let seed = match at.with_nanosecond(0) {
            Some(truncated) if truncated != at => truncated,
            _ => at - Duration::seconds(1),
        };
        let next = self.schedule.after(&seed).next();
        if next.is_none() {
            warn!("无法计算下一次执行时间: {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        next
    }
}

/// 单个 crontab 字段允许的取值范围
#[derive(Debug, Clone, Copy)]
struct FieldBounds {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: FieldBounds = FieldBounds { name: "minute", min: 0, max: 59 };
const HOUR: FieldBounds = FieldBounds { name: "hour", min: 0, max: 23 };
const DAY_OF_MONTH: FieldBounds = FieldBounds { name: "day_of_month", min: 1, max: 31 };
const MONTH_OF_YEAR: FieldBounds = FieldBounds { name: "month_of_year", min: 1, max: 12 };
const DAY_OF_WEEK: FieldBounds = FieldBounds { name: "day_of_week", min: 0, max: 6 };

/// 将 crontab 字段翻译为 cron crate 的表达式 `"0 min hour dom month dow"`
///
/// 星期字段按 0-6（周日为 0）解析，输出时转换为 cron crate 的 1-7（周日为 1）。
pub fn crontab_to_cron_expression(spec: &CrontabSpec) -> SchedulerResult<String> {
    let minute = render_field(&spec.minute, MINUTE, 0)?;
    let hour = render_field(&spec.hour, HOUR, 0)?;
    let day_of_month = render_field(&spec.day_of_month, DAY_OF_MONTH, 0)?;
    let month_of_year = render_field(&spec.month_of_year, MONTH_OF_YEAR, 0)?;
    let day_of_week = render_field(&spec.day_of_week, DAY_OF_WEEK, 1)?;

    let expr = format!("0 {minute} {hour} {day_of_month} {month_of_year} {day_of_week}");
    debug!("crontab 翻译结果: {}", expr);
    Ok(expr)
}

fn render_field(field: &str, bounds: FieldBounds, offset: u32) -> SchedulerResult<String> {
    let field = field.trim();
    if field == "*" {
        return Ok("*".to_string());
    }

    let values = parse_field(field, bounds)?;
    Ok(values
        .iter()
        .map(|v| (v + offset).to_string())
        .collect::<Vec<_>>()
        .join(","))
}

/// 展开单个字段：支持 `*`、`*/n`、`a`、`a-b`、`a-b/n` 以及逗号分隔的组合
fn parse_field(field: &str, bounds: FieldBounds) -> SchedulerResult<Vec<u32>> {
    let invalid = |message: String| {
        SchedulerError::config_error(format!("crontab 字段 {} 无效 ({field:?}): {message}", bounds.name))
    };

    if field.is_empty() {
        return Err(invalid("字段为空".to_string()));
    }

    let mut values = BTreeSet::new();
    for part in field.split(',') {
        let part = part.trim();
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(format!("步长不是数字: {step}")))?;
                if step == 0 {
                    return Err(invalid("步长必须大于 0".to_string()));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" {
            (bounds.min, bounds.max)
        } else if let Some((start, end)) = range.split_once('-') {
            (parse_value(start, bounds).map_err(&invalid)?, parse_value(end, bounds).map_err(&invalid)?)
        } else {
            let value = parse_value(range, bounds).map_err(&invalid)?;
            // `a/n` 表示从 a 开始直到上界
            if step > 1 {
                (value, bounds.max)
            } else {
                (value, value)
            }
        };

        if start > end {
            return Err(invalid(format!("范围起点大于终点: {start}-{end}")));
        }
        values.extend((start..=end).step_by(step as usize));
    }

    Ok(values.into_iter().collect())
}

fn parse_value(raw: &str, bounds: FieldBounds) -> Result<u32, String> {
    let value: u32 = raw.trim().parse().map_err(|_| format!("不是数字: {raw}"))?;
    if value < bounds.min || value > bounds.max {
        return Err(format!("{value} 超出范围 {}-{}", bounds.min, bounds.max));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_field_values(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
        parse_field(field, FieldBounds { name: "field", min, max }).ok()
    }

    #[test]
    fn test_parse_field_forms() {
        assert_eq!(parse_field_values("*/15", 0, 59), Some(vec![0, 15, 30, 45]));
        assert_eq!(parse_field_values("1-5", 0, 6), Some(vec![1, 2, 3, 4, 5]));
        assert_eq!(parse_field_values("0-10/5", 0, 59), Some(vec![0, 5, 10]));
        assert_eq!(parse_field_values("30,0,15", 0, 59), Some(vec![0, 15, 30]));
        assert_eq!(parse_field_values("60", 0, 59), None);
        assert_eq!(parse_field_values("5-1", 0, 59), None);
        assert_eq!(parse_field_values("*/0", 0, 59), None);
        assert_eq!(parse_field_values("", 0, 59), None);
    }

    #[test]
    fn test_day_of_week_shifted_for_cron_crate() {
        let spec = CrontabSpec::default().minute("30").hour("8").day_of_week("0,6");
        assert_eq!(crontab_to_cron_expression(&spec).unwrap(), "0 30 8 * * 1,7");
    }

    #[test]
    fn test_out_of_range_is_configuration_error() {
        let spec = CrontabSpec::default().hour("24");
        let err = crontab_to_cron_expression(&spec).unwrap_err();
        assert!(matches!(err, SchedulerError::Configuration(_)));
        assert!(err.to_string().contains("hour"));
    }
}
