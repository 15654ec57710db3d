//! Courier companies and tracking numbers
//!
//! Orders record a courier code (e.g. `SF`) and a tracking number once they
//! ship. The dashboard turns the pair into a courier tracking page; unknown
//! couriers fall back to the kuaidi100 aggregator.

use serde::Serialize;

/// Placeholder replaced by the tracking number in query URLs
const TRACKING_PLACEHOLDER: &str = "{trackingNumber}";

/// Aggregator used when the courier is unknown
pub const UNIVERSAL_QUERY_URL: &str = "https://www.kuaidi100.com/?keyword={trackingNumber}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShippingCompany {
    pub code: &'static str,
    pub name: &'static str,
    pub query_url: &'static str,
}

pub const SHIPPING_COMPANIES: [ShippingCompany; 13] = [
    ShippingCompany {
        code: "SF",
        name: "顺丰速运",
        query_url: "https://www.sf-express.com/sf-service-owf-web-main/dist/index.html#/search/result?keyword={trackingNumber}",
    },
    ShippingCompany {
        code: "ZTO",
        name: "中通快递",
        query_url: "https://www.zto.com/ztoQuery/html/query.html?keyword={trackingNumber}",
    },
    ShippingCompany {
        code: "YTO",
        name: "圆通速递",
        query_url: "https://www.yto.net.cn/query/index/index.html?keyword={trackingNumber}",
    },
    ShippingCompany {
        code: "STO",
        name: "申通快递",
        query_url: "https://www.sto.cn/query/index.html?keyword={trackingNumber}",
    },
    ShippingCompany {
        code: "YD",
        name: "韵达快递",
        query_url: "https://www.yundaex.com/kuaidi/kuaidi.html?keyword={trackingNumber}",
    },
    ShippingCompany {
        code: "JD",
        name: "京东物流",
        query_url: "https://www.jdl.com/query/index.html?keyword={trackingNumber}",
    },
    ShippingCompany {
        code: "EMS",
        name: "中国邮政",
        query_url: "https://www.ems.com.cn/queryList?keyword={trackingNumber}",
    },
    ShippingCompany {
        code: "DBL",
        name: "德邦快递",
        query_url: "https://www.deppon.com/query/index.html?keyword={trackingNumber}",
    },
    ShippingCompany {
        code: "HTKY",
        name: "百世快递",
        query_url: "https://www.800best.com/query/index.html?keyword={trackingNumber}",
    },
    ShippingCompany {
        code: "TNT",
        name: "TNT快递",
        query_url: "https://www.tnt.com/express/zh_cn/tracking.html?keyword={trackingNumber}",
    },
    ShippingCompany {
        code: "DHL",
        name: "DHL快递",
        query_url: "https://www.dhl.com/cn-zh/home/tracking/tracking-parcel.html?submit=1&tracking-id={trackingNumber}",
    },
    ShippingCompany {
        code: "FEDEX",
        name: "联邦快递",
        query_url: "https://www.fedex.com/zh-cn/tracking.html?trcknum={trackingNumber}",
    },
    ShippingCompany {
        code: "UPS",
        name: "UPS快递",
        query_url: "https://www.ups.com/track?loc=zh_CN&tracknum={trackingNumber}",
    },
];

/// Look up a courier by code, ignoring case and surrounding whitespace
pub fn shipping_company(code: &str) -> Option<&'static ShippingCompany> {
    let code = code.trim();
    SHIPPING_COMPANIES
        .iter()
        .find(|c| c.code.eq_ignore_ascii_case(code))
}

/// Display name of a courier; unknown codes are returned unchanged
pub fn shipping_company_name(code: &str) -> String {
    shipping_company(code)
        .map(|c| c.name.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// Tracking page for a shipment, falling back to the aggregator
pub fn shipping_query_url(company_code: &str, tracking_number: &str) -> String {
    let template = shipping_company(company_code)
        .map(|c| c.query_url)
        .unwrap_or(UNIVERSAL_QUERY_URL);
    template.replace(TRACKING_PLACEHOLDER, tracking_number.trim())
}

/// 8 to 20 ASCII letters or digits
pub fn is_valid_tracking_number(tracking_number: &str) -> bool {
    (8..=20).contains(&tracking_number.len())
        && tracking_number.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Guess the courier from the tracking number's shape
pub fn guess_shipping_company(tracking_number: &str) -> Option<&'static str> {
    let upper = tracking_number.trim().to_ascii_uppercase();
    let digits_after = |prefix: &str| {
        upper
            .strip_prefix(prefix)
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
    };

    if digits_after("SF") {
        Some("SF")
    } else if digits_after("JD") {
        Some("JD")
    } else if ["E", "C", "K"].iter().any(|p| digits_after(p)) {
        Some("EMS")
    } else {
        None
    }
}
