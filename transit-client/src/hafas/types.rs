//! DTOs for the HAFAS client-interface JSON envelope.
//!
//! Only the fields the normalizer consumes are declared; everything else in
//! the envelope is ignored by serde. All cross-references (`locX`, `prodX`,
//! `remX`, ...) are indices into the `common` lookup tables and are resolved
//! in [`super::parse`].

use serde::Deserialize;

/// Top-level response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HafasResponse {
    #[serde(default)]
    pub err: Option<String>,
    #[serde(default)]
    pub err_txt: Option<String>,
    #[serde(default)]
    pub svc_res_l: Vec<SvcRes>,
}

/// One service result within the envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SvcRes {
    pub meth: String,
    #[serde(default)]
    pub err: Option<String>,
    #[serde(default)]
    pub err_txt: Option<String>,
    #[serde(default)]
    pub res: Option<Res>,
}

/// The kitchen-sink result body; each method fills a subset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Res {
    #[serde(default)]
    pub common: Option<Common>,
    /// LocMatch nests its hits one level deeper.
    #[serde(default, rename = "match")]
    pub match_: Option<LocMatch>,
    /// LocGeoPos hits.
    #[serde(default)]
    pub loc_l: Vec<Loc>,
    /// StationBoard journeys.
    #[serde(default)]
    pub jny_l: Vec<Jny>,
    /// TripSearch / Reconstruction connections.
    #[serde(default)]
    pub out_con_l: Vec<OutCon>,
    /// Scroll cursor for earlier results.
    #[serde(default)]
    pub out_ctx_scr_b: Option<String>,
    /// Scroll cursor for later results.
    #[serde(default)]
    pub out_ctx_scr_f: Option<String>,
    /// JourneyDetails payload.
    #[serde(default)]
    pub journey: Option<Jny>,
    /// Response-level notices.
    #[serde(default)]
    pub msg_l: Vec<Msg>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocMatch {
    #[serde(default)]
    pub loc_l: Vec<Loc>,
}

/// Shared lookup tables referenced by index from the payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Common {
    #[serde(default)]
    pub loc_l: Vec<Loc>,
    #[serde(default)]
    pub prod_l: Vec<Prod>,
    #[serde(default)]
    pub op_l: Vec<Op>,
    #[serde(default)]
    pub rem_l: Vec<Rem>,
    #[serde(default)]
    pub him_l: Vec<Him>,
    #[serde(default)]
    pub poly_l: Vec<Poly>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loc {
    /// Opaque location id string ("A=1@O=...@L=...").
    #[serde(default)]
    pub lid: Option<String>,
    /// "S" station, "P" POI, "A" address.
    #[serde(rename = "type", default)]
    pub loc_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ext_id: Option<String>,
    #[serde(default)]
    pub crd: Option<Crd>,
    /// Product-class bitmask of the services calling here.
    #[serde(default)]
    pub p_cls: Option<u32>,
}

/// `x` is longitude, `y` latitude, both in micro-degrees.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Crd {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prod {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub line: Option<String>,
    #[serde(default)]
    pub cls: Option<u32>,
    #[serde(default)]
    pub opr_x: Option<usize>,
    #[serde(default)]
    pub prod_ctx: Option<ProdCtx>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProdCtx {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub num: Option<String>,
    #[serde(default)]
    pub line: Option<String>,
    #[serde(default)]
    pub cat_out: Option<String>,
    #[serde(default)]
    pub admin: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Op {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rem {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(rename = "type", default)]
    pub rem_type: Option<String>,
    #[serde(default)]
    pub txt_n: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Him {
    #[serde(default)]
    pub head: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poly {
    pub crd_enc_y_x: String,
}

/// A vehicle run (StationBoard entry, JourneyDetails payload, or the `jny`
/// of a trip section).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Jny {
    #[serde(default)]
    pub jid: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub prod_x: Option<usize>,
    #[serde(default)]
    pub dir_txt: Option<String>,
    #[serde(default)]
    pub is_cncl: bool,
    #[serde(default)]
    pub stop_l: Vec<JnyStop>,
    #[serde(default)]
    pub poly_g: Option<PolyG>,
    #[serde(default)]
    pub poly: Option<Poly>,
    #[serde(default)]
    pub msg_l: Vec<Msg>,
    /// StationBoard: the stop event at the queried station.
    #[serde(default)]
    pub stb_stop: Option<JnyStop>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolyG {
    #[serde(default)]
    pub poly_x_l: Vec<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Msg {
    #[serde(default)]
    pub rem_x: Option<usize>,
    #[serde(default)]
    pub him_x: Option<usize>,
}

/// One stop event. `S` suffixes are scheduled, `R` realtime.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JnyStop {
    #[serde(default)]
    pub loc_x: Option<usize>,
    #[serde(default)]
    pub a_time_s: Option<String>,
    #[serde(default)]
    pub a_time_r: Option<String>,
    #[serde(default)]
    pub a_platf_s: Option<String>,
    #[serde(default)]
    pub a_platf_r: Option<String>,
    #[serde(default)]
    pub a_pltf_s: Option<Pltf>,
    #[serde(default)]
    pub a_pltf_r: Option<Pltf>,
    #[serde(default)]
    pub a_cncl: bool,
    #[serde(default)]
    pub d_time_s: Option<String>,
    #[serde(default)]
    pub d_time_r: Option<String>,
    #[serde(default)]
    pub d_platf_s: Option<String>,
    #[serde(default)]
    pub d_platf_r: Option<String>,
    #[serde(default)]
    pub d_pltf_s: Option<Pltf>,
    #[serde(default)]
    pub d_pltf_r: Option<Pltf>,
    #[serde(default)]
    pub d_cncl: bool,
    #[serde(default)]
    pub msg_l: Vec<Msg>,
}

/// Newer installations wrap platforms in an object.
#[derive(Debug, Clone, Deserialize)]
pub struct Pltf {
    #[serde(default)]
    pub txt: Option<String>,
}

/// One connection (trip) of a TripSearch / Reconstruction result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutCon {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub ctx_recon: Option<String>,
    #[serde(default)]
    pub recon: Option<Recon>,
    pub dep: JnyStop,
    pub arr: JnyStop,
    #[serde(default)]
    pub sec_l: Vec<Sec>,
    #[serde(default)]
    pub trf_res: Option<TrfRes>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recon {
    #[serde(default)]
    pub ctx: Option<String>,
}

/// A section of a connection: a vehicle run or an individual movement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sec {
    /// "JNY", "WALK", "TRSF", "BIKE", "KISS", "TAXI", "DEVI".
    #[serde(rename = "type")]
    pub sec_type: String,
    pub dep: JnyStop,
    pub arr: JnyStop,
    #[serde(default)]
    pub jny: Option<Jny>,
    #[serde(default)]
    pub gis: Option<Gis>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gis {
    #[serde(default)]
    pub dist: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrfRes {
    #[serde(default)]
    pub fare_set_l: Vec<FareSet>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FareSet {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fare_l: Vec<FareItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FareItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cur: Option<String>,
    /// Price in minor currency units; absent or negative means "no price".
    #[serde(default)]
    pub prc: Option<i64>,
    #[serde(default)]
    pub price: Option<Price>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    #[serde(default)]
    pub amount: Option<i64>,
}

impl FareItem {
    /// The price in minor units, from whichever field the installation uses.
    pub fn amount(&self) -> Option<i64> {
        self.price
            .as_ref()
            .and_then(|p| p.amount)
            .or(self.prc)
            .filter(|a| *a > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_loc_match_envelope() {
        let body = r#"{
            "ver": "1.45",
            "svcResL": [{
                "meth": "LocMatch",
                "err": "OK",
                "res": {
                    "common": {"locL": []},
                    "match": {"locL": [{
                        "lid": "A=1@O=Berlin Hbf@L=8011160@",
                        "type": "S",
                        "name": "Berlin Hbf",
                        "extId": "8011160",
                        "crd": {"x": 13369549, "y": 52525589},
                        "pCls": 319
                    }]}
                }
            }]
        }"#;
        let response: HafasResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.svc_res_l.len(), 1);
        let res = response.svc_res_l[0].res.as_ref().unwrap();
        let locs = &res.match_.as_ref().unwrap().loc_l;
        assert_eq!(locs[0].ext_id.as_deref(), Some("8011160"));
        assert_eq!(locs[0].crd.unwrap().y, 52_525_589);
    }

    #[test]
    fn deserialize_stop_times_and_platform_shapes() {
        let body = r#"{
            "locX": 3,
            "dTimeS": "102300",
            "dTimeR": "01002600",
            "dPlatfS": "7",
            "dPltfR": {"txt": "9", "type": "PL"},
            "dCncl": false
        }"#;
        let stop: JnyStop = serde_json::from_str(body).unwrap();
        assert_eq!(stop.loc_x, Some(3));
        assert_eq!(stop.d_time_r.as_deref(), Some("01002600"));
        assert_eq!(stop.d_platf_s.as_deref(), Some("7"));
        assert_eq!(stop.d_pltf_r.unwrap().txt.as_deref(), Some("9"));
    }

    #[test]
    fn fare_amount_prefers_price_object() {
        let with_object: FareItem =
            serde_json::from_str(r#"{"prc": 100, "price": {"amount": 360}}"#).unwrap();
        assert_eq!(with_object.amount(), Some(360));
        let legacy: FareItem = serde_json::from_str(r#"{"prc": 360}"#).unwrap();
        assert_eq!(legacy.amount(), Some(360));
        let absent: FareItem = serde_json::from_str(r#"{"prc": -1}"#).unwrap();
        assert_eq!(absent.amount(), None);
    }
}
