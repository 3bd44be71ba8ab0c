//! Weather briefing: forecast + air quality + place name, optionally localized by the LLM,
//! rendered as a MarkdownV2 report.

use serde::Serialize;

use crate::context::BotContext;
use crate::error::BotError;
use crate::format::{bold, escape_markdown_v2, spoiler};
use crate::llm::{prompts, str_field};
use crate::services::{AirPollution, OneCall, ServiceError};

const GRADES: [&str; 5] = ["좋음", "보통", "경계", "나쁨", "매우 나쁨"];
const AQI_LABELS: [&str; 5] = ["좋음", "양호", "보통", "나쁨", "매우 나쁨"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pollutant {
    Pm2_5,
    Pm10,
    So2,
    No2,
    O3,
    Co,
}

impl Pollutant {
    /// Lower bounds (μg/m³) of the grades after "좋음".
    fn thresholds(self) -> [f64; 4] {
        match self {
            Pollutant::Pm2_5 => [10.0, 25.0, 50.0, 75.0],
            Pollutant::Pm10 => [20.0, 50.0, 100.0, 200.0],
            Pollutant::So2 => [20.0, 80.0, 250.0, 350.0],
            Pollutant::No2 => [40.0, 70.0, 150.0, 200.0],
            Pollutant::O3 => [60.0, 100.0, 140.0, 180.0],
            Pollutant::Co => [4400.0, 9400.0, 12400.0, 15400.0],
        }
    }

    pub fn grade(self, value: f64) -> &'static str {
        let above = self.thresholds().iter().filter(|&&t| value >= t).count();
        GRADES[above]
    }
}

fn aqi_label(aqi: u8) -> &'static str {
    AQI_LABELS[usize::from(aqi.clamp(1, 5)) - 1]
}

/// Report data. The Korean keys are what the LLM sees.
#[derive(Debug, Clone, Serialize)]
pub struct WeatherReport {
    #[serde(rename = "지역")]
    pub location: String,
    #[serde(rename = "오늘 요약")]
    pub summary: String,
    #[serde(rename = "날씨 상태")]
    pub condition: String,
    #[serde(rename = "현재 체감 온도")]
    pub feels_like_now: f64,
    #[serde(rename = "가시거리(km)")]
    pub visibility_km: Option<f64>,
    #[serde(rename = "최고 기온")]
    pub temp_max: f64,
    #[serde(rename = "최저 기온")]
    pub temp_min: f64,
    #[serde(rename = "낮 체감 온도")]
    pub feels_like_day: f64,
    #[serde(rename = "저녁 체감 온도")]
    pub feels_like_eve: f64,
    #[serde(rename = "밤 체감 온도")]
    pub feels_like_night: f64,
    #[serde(rename = "습도")]
    pub humidity: f64,
    #[serde(rename = "풍속")]
    pub wind_speed: f64,
    #[serde(rename = "돌풍")]
    pub wind_gust: Option<f64>,
    #[serde(rename = "강수량(mm)")]
    pub rain_mm: f64,
    #[serde(rename = "적설량(mm)")]
    pub snow_mm: f64,
    #[serde(rename = "강수 확률(%)")]
    pub precipitation_chance: f64,
    #[serde(rename = "자외선 지수")]
    pub uvi: f64,
    #[serde(rename = "경보")]
    pub alert: String,
    #[serde(rename = "대기질 지수")]
    pub air_quality: &'static str,
    #[serde(rename = "초미세먼지")]
    pub pm2_5: f64,
    #[serde(rename = "미세먼지")]
    pub pm10: f64,
    #[serde(rename = "오존")]
    pub o3: f64,
    #[serde(rename = "이산화질소")]
    pub no2: f64,
    #[serde(rename = "이산화황")]
    pub so2: f64,
    #[serde(rename = "일산화탄소")]
    pub co: f64,
    #[serde(skip)]
    pub suggestion: Option<String>,
}

impl WeatherReport {
    pub fn build(
        location: String,
        forecast: &OneCall,
        air: &AirPollution,
    ) -> Result<Self, ServiceError> {
        let today = forecast
            .daily
            .first()
            .ok_or_else(|| ServiceError::Malformed("forecast without daily data".to_string()))?;
        let sample = air
            .list
            .first()
            .ok_or_else(|| ServiceError::Malformed("air pollution without samples".to_string()))?;
        let alert = forecast
            .alerts
            .iter()
            .map(|a| {
                if a.description.trim().is_empty() {
                    a.event.clone()
                } else {
                    format!("{}: {}", a.event, a.description.trim())
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        let c = &sample.components;
        Ok(Self {
            location,
            summary: today.summary.clone().unwrap_or_default(),
            condition: today
                .weather
                .first()
                .map(|w| w.description.clone())
                .unwrap_or_default(),
            feels_like_now: forecast.current.feels_like,
            visibility_km: forecast.current.visibility.map(|m| m / 1000.0),
            temp_max: today.temp.max,
            temp_min: today.temp.min,
            feels_like_day: today.feels_like.day,
            feels_like_eve: today.feels_like.eve,
            feels_like_night: today.feels_like.night,
            humidity: today.humidity,
            wind_speed: today.wind_speed,
            wind_gust: today.wind_gust,
            rain_mm: today.rain,
            snow_mm: today.snow,
            precipitation_chance: (today.pop * 100.0).round(),
            uvi: today.uvi,
            alert,
            air_quality: aqi_label(sample.main.aqi),
            pm2_5: c.pm2_5,
            pm10: c.pm10,
            o3: c.o3,
            no2: c.no2,
            so2: c.so2,
            co: c.co,
            suggestion: None,
        })
    }

    /// Translate fields and add advice with the LLM. On failure the report stays as built.
    pub async fn localize(&mut self, ctx: &BotContext) {
        let data = match serde_json::to_string_pretty(self) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("weather report serialization failed: {}", e);
                return;
            }
        };
        let llm = &ctx.services.llm;
        let result = ctx
            .retry
            .run("weather advice", || {
                llm.complete_json(prompts::WEATHER_SYSTEM, &data, 0.2)
            })
            .await;
        match result {
            Ok(v) => {
                let location = str_field(&v, "location_ko");
                if !location.is_empty() {
                    self.location = location;
                }
                let summary = str_field(&v, "summary_ko");
                if !summary.is_empty() {
                    self.summary = summary;
                }
                if !self.alert.is_empty() {
                    let alert = str_field(&v, "alert_ko");
                    if !alert.is_empty() {
                        self.alert = alert;
                    }
                }
                let suggestion = str_field(&v, "suggestion");
                self.suggestion = (!suggestion.is_empty()).then_some(suggestion);
            }
            Err(e) => log::warn!("weather localization failed, sending raw report: {}", e),
        }
    }

    pub fn render(&self) -> String {
        let num = |v: f64| escape_markdown_v2(&format!("{:.1}", v));
        let mut out = format!("{} 🌦\n", bold(&format!("{} 날씨 브리핑", self.location)));
        if !self.summary.is_empty() {
            out.push_str(&format!("\n{}\n", escape_markdown_v2(&self.summary)));
        }
        if let Some(s) = &self.suggestion {
            out.push_str(&format!("\n💡 {}\n", escape_markdown_v2(s)));
        }
        if !self.alert.is_empty() {
            out.push_str(&format!(
                "\n{}\n{}\n",
                bold("🚨 경보 🚨"),
                escape_markdown_v2(&self.alert)
            ));
        }
        out.push_str(&format!("\n{}\n", escape_markdown_v2(&"-".repeat(25))));

        out.push_str(&format!("{} 🌡️\n", bold("오늘의 날씨")));
        if !self.condition.is_empty() {
            out.push_str(&format!("• 날씨: {}\n", escape_markdown_v2(&self.condition)));
        }
        out.push_str(&format!(
            "• 기온: {}°C ~ {}°C\n",
            num(self.temp_min),
            num(self.temp_max)
        ));
        out.push_str(&format!(
            "• 체감: 지금 {}°C / 낮 {}°C / 저녁 {}°C\n",
            num(self.feels_like_now),
            num(self.feels_like_day),
            num(self.feels_like_eve)
        ));
        let mut precipitation = format!("• 강수 확률: {}%", self.precipitation_chance);
        if self.rain_mm > 0.0 {
            precipitation.push_str(&format!(" \\(비 {}mm\\)", num(self.rain_mm)));
        }
        if self.snow_mm > 0.0 {
            precipitation.push_str(&format!(" \\(눈 {}mm\\)", num(self.snow_mm)));
        }
        out.push_str(&precipitation);
        out.push('\n');
        out.push_str(&format!("• 자외선 지수: {}\n", num(self.uvi)));

        out.push_str(&format!("\n{} 🍃\n", bold("대기 질")));
        out.push_str(&format!("• 종합: {}\n", self.air_quality));
        out.push_str(&format!(
            "• 초미세먼지: {}㎍/㎥ \\({}\\)\n",
            num(self.pm2_5),
            Pollutant::Pm2_5.grade(self.pm2_5)
        ));
        out.push_str(&format!(
            "• 미세먼지: {}㎍/㎥ \\({}\\)\n",
            num(self.pm10),
            Pollutant::Pm10.grade(self.pm10)
        ));

        let mut details = vec![
            format!("습도 {}%", num(self.humidity)),
            format!("풍속 {}m/s", num(self.wind_speed)),
        ];
        if let Some(g) = self.wind_gust {
            details.push(format!("돌풍 {}m/s", num(g)));
        }
        if let Some(v) = self.visibility_km {
            details.push(format!("가시거리 {}km", num(v)));
        }
        details.push(format!("밤 체감 {}°C", num(self.feels_like_night)));
        for (name, pollutant, value) in [
            ("오존", Pollutant::O3, self.o3),
            ("이산화질소", Pollutant::No2, self.no2),
            ("이산화황", Pollutant::So2, self.so2),
            ("일산화탄소", Pollutant::Co, self.co),
        ] {
            details.push(format!("{} {} \\({}\\)", name, num(value), pollutant.grade(value)));
        }
        out.push_str(&format!("\n{}", spoiler(&details.join("\n"))));
        out
    }
}

/// Briefing for coordinates.
pub async fn briefing_at(ctx: &BotContext, latitude: f64, longitude: f64) -> Result<String, BotError> {
    let weather = &ctx.services.weather;
    let forecast = ctx
        .retry
        .run("onecall", || weather.forecast(latitude, longitude))
        .await?;
    let air = ctx
        .retry
        .run("air pollution", || weather.air_quality(latitude, longitude))
        .await?;
    let place = match ctx
        .retry
        .run("reverse geocoding", || weather.place_name(latitude, longitude))
        .await
    {
        Ok(p) => p,
        Err(e) => {
            log::warn!("reverse geocoding {},{} failed: {}", latitude, longitude, e);
            format!("{:.4}, {:.4}", latitude, longitude)
        }
    };
    let mut report = WeatherReport::build(place, &forecast, &air)?;
    report.localize(ctx).await;
    Ok(report.render())
}

/// Briefing for a free-text place name.
pub async fn briefing_for_place(ctx: &BotContext, query: &str) -> Result<String, BotError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(BotError::input("지역 이름이 필요합니다."));
    }
    let geocoder = &ctx.services.geocoder;
    let (latitude, longitude) = match ctx.retry.run("geocode", || geocoder.locate(query)).await {
        Err(ServiceError::NotFound) => {
            return Err(BotError::input(format!("'{}' 위치를 찾을 수 없습니다.", query)))
        }
        other => other?,
    };
    briefing_at(ctx, latitude, longitude).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        AirComponents, AirIndex, AirSample, Condition, CurrentWeather, DailyForecast, FeelsLike,
        Temperature,
    };

    fn fixture() -> (OneCall, AirPollution) {
        let forecast = OneCall {
            current: CurrentWeather {
                feels_like: 12.3,
                visibility: Some(10000.0),
            },
            daily: vec![DailyForecast {
                summary: Some("Clear day".to_string()),
                temp: Temperature { min: 8.0, max: 19.5 },
                feels_like: FeelsLike {
                    day: 18.0,
                    eve: 15.0,
                    night: 9.0,
                },
                humidity: 45.0,
                wind_speed: 2.5,
                wind_gust: None,
                rain: 0.0,
                snow: 0.0,
                pop: 0.12,
                uvi: 5.2,
                weather: vec![Condition {
                    description: "맑음".to_string(),
                }],
            }],
            alerts: Vec::new(),
        };
        let air = AirPollution {
            list: vec![AirSample {
                main: AirIndex { aqi: 2 },
                components: AirComponents {
                    pm2_5: 18.0,
                    pm10: 30.0,
                    ..AirComponents::default()
                },
            }],
        };
        (forecast, air)
    }

    #[test]
    fn grades_follow_thresholds() {
        assert_eq!(Pollutant::Pm2_5.grade(9.9), "좋음");
        assert_eq!(Pollutant::Pm2_5.grade(10.0), "보통");
        assert_eq!(Pollutant::Pm10.grade(150.0), "나쁨");
        assert_eq!(Pollutant::Co.grade(20000.0), "매우 나쁨");
    }

    #[test]
    fn render_escapes_and_includes_sections() {
        let (forecast, air) = fixture();
        let report = WeatherReport::build("서울".to_string(), &forecast, &air).unwrap();
        assert_eq!(report.precipitation_chance, 12.0);
        let text = report.render();
        assert!(text.starts_with("*서울 날씨 브리핑* 🌦\n"));
        assert!(text.contains("Clear day"));
        assert!(text.contains("• 기온: 8\\.0°C ~ 19\\.5°C"));
        assert!(text.contains("• 초미세먼지: 18\\.0㎍/㎥ \\(보통\\)"));
        assert!(text.contains("||습도 45\\.0%"));
        assert!(!text.contains("경보"));
        assert!(text.ends_with("||"));
    }

    #[test]
    fn build_without_daily_data_is_malformed() {
        let (mut forecast, air) = fixture();
        forecast.daily.clear();
        assert!(matches!(
            WeatherReport::build("x".to_string(), &forecast, &air),
            Err(ServiceError::Malformed(_))
        ));
    }
}
