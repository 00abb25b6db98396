//! Line and product classification.
//!
//! Transit backends do not agree on a product taxonomy; the brand string is
//! often the only reliable signal. Classification is therefore a strictly
//! ordered cascade of empirically observed exact-match rules, first match
//! wins, terminating in a product-less fallback. The mot-0 rail-brand table
//! is a compatibility contract with real-world backend data: entries are
//! matched in table order and must not be reordered.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{Line, Product};

/// The raw field bundle a backend attaches to one service.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawLine<'a> {
    /// Backend route key.
    pub id: Option<&'a str>,
    /// Network/agency the fields came from.
    pub network: Option<&'a str>,
    /// Means-of-transport code ("0".."19"), absent on some endpoints.
    pub mot: Option<&'a str>,
    /// Short symbol, e.g. "S2" or "118".
    pub symbol: Option<&'a str>,
    /// Short name.
    pub name: Option<&'a str>,
    /// Long descriptive name.
    pub long_name: Option<&'a str>,
    /// Train-type code, e.g. "ICE".
    pub train_type: Option<&'a str>,
    /// Train number, e.g. "75".
    pub train_num: Option<&'a str>,
    /// Train/service name, e.g. "InterCityExpress".
    pub train_name: Option<&'a str>,
}

/// One entry of the mot-0 rail-brand table.
///
/// Matches when `train_type` equals `code` or `train_name` is one of
/// `names`, and (unless `num_optional`) a non-empty train number exists.
/// The label is `code` + train number.
struct RailBrand {
    code: &'static str,
    names: &'static [&'static str],
    product: Option<Product>,
    num_optional: bool,
}

const fn brand(
    code: &'static str,
    names: &'static [&'static str],
    product: Option<Product>,
) -> RailBrand {
    RailBrand {
        code,
        names,
        product,
        num_optional: false,
    }
}

use Product::{
    Bus, Cablecar, Ferry, HighSpeedTrain as Hst, OnDemand, RegionalTrain as Reg,
    SuburbanTrain as Sub, Tram,
};

/// Rail-replacement markers come first: they always classify as bus,
/// whatever brand fields ride along.
static REPLACEMENT_RULES: &[RailBrand] = &[
    RailBrand {
        code: "SEV",
        names: &[
            "SEV",
            "Ersatzverkehr",
            "Schienenersatzverkehr",
            "Bus Ersatzverkehr",
            "Busnotverkehr",
            "Busverkehr",
            "Ersatzzug",
        ],
        product: Some(Bus),
        num_optional: true,
    },
    RailBrand {
        code: "SVV",
        names: &["Schienenersatz-Verkehr"],
        product: Some(Bus),
        num_optional: true,
    },
    RailBrand {
        code: "EV",
        names: &["Ersatzfahrt"],
        product: Some(Bus),
        num_optional: true,
    },
    RailBrand {
        code: "BSV",
        names: &["Bus SEV"],
        product: Some(Bus),
        num_optional: true,
    },
];

/// The ordered mot-0 brand table. First match wins.
static RAIL_BRANDS: &[RailBrand] = &[
    // Long-distance / high speed.
    brand("EC", &["EuroCity", "Eurocity"], Some(Hst)),
    brand("EN", &["EuroNight"], Some(Hst)),
    brand("IC", &["InterCity", "Intercity"], Some(Hst)),
    brand("ICE", &["InterCityExpress", "Intercity-Express"], Some(Hst)),
    brand("ICN", &["Intercity-Neigezug"], Some(Hst)),
    brand("X", &["InterConnex"], Some(Hst)),
    brand("CNL", &["CityNightLine"], Some(Hst)),
    brand("NJ", &["nightjet"], Some(Hst)),
    brand("OEC", &["ÖBB-EuroCity"], Some(Hst)),
    brand("OIC", &["ÖBB-InterCity"], Some(Hst)),
    brand("RJ", &["railjet"], Some(Hst)),
    brand("RJX", &["railjet xpress"], Some(Hst)),
    brand("WB", &["WESTbahn", "Westbahn"], Some(Hst)),
    brand("HKX", &["Hamburg-Köln-Express"], Some(Hst)),
    brand("FLX", &["FlixTrain"], Some(Hst)),
    brand("TGV", &["Train à Grande Vitesse"], Some(Hst)),
    brand("THA", &["Thalys"], Some(Hst)),
    brand("EST", &["EUROSTAR", "Eurostar"], Some(Hst)),
    brand("ES", &["Eurostar Italia"], Some(Hst)),
    brand("EXE", &["Exclusiv-Express"], Some(Hst)),
    brand("D", &["D-Zug", "Schnellzug"], Some(Hst)),
    brand("DNZ", &["Nacht-Schnellzug"], Some(Hst)),
    brand("AIR", &["AIRail"], Some(Hst)),
    brand("TLK", &["Twoje Linie Kolejowe"], Some(Hst)),
    brand("EIC", &["Express InterCity"], Some(Hst)),
    brand("EIP", &["Express InterCity Premium"], Some(Hst)),
    brand("SC", &["SuperCity"], Some(Hst)),
    brand("LEO", &["LEO Express"], Some(Hst)),
    brand("RGJ", &["regiojet"], Some(Hst)),
    brand("HBX", &["Harz-Berlin-Express"], Some(Hst)),
    brand("FLUG", &["Flugzeug"], Some(Hst)),
    brand("INT", &["International"], Some(Hst)),
    brand("MET", &["Metropolitan"], Some(Hst)),
    brand("NZ", &["Nacht-Zug", "Nachtzug"], Some(Hst)),
    brand("AZ", &["Auto-Zug"], Some(Hst)),
    brand("ARZ", &["Autoreisezug"], Some(Hst)),
    brand("AVE", &["Alta Velocidad Española"], Some(Hst)),
    brand("ALS", &["Alaris"], Some(Hst)),
    brand("ARC", &["Arco"], Some(Hst)),
    brand("TAL", &["Talgo"], Some(Hst)),
    brand("EM", &["Euromed"], Some(Hst)),
    brand("X2", &["X2000"], Some(Hst)),
    brand("LYN", &["Lyntog"], Some(Hst)),
    brand("GEX", &["Glacier Express"], Some(Hst)),
    brand("BEX", &["Bernina Express"], Some(Hst)),
    brand("RHI", &[], Some(Hst)),
    brand("RHT", &[], Some(Hst)),
    brand("TGD", &[], Some(Hst)),
    // Inter-regional.
    brand("IR", &["InterRegio", "Interregio"], Some(Reg)),
    brand("IRE", &["Interregio-Express", "InterRegioExpress"], Some(Reg)),
    brand("RE", &["Regional-Express", "RegionalExpress"], Some(Reg)),
    brand("REX", &["Regionalexpress"], Some(Reg)),
    brand("RB", &["Regionalbahn"], Some(Reg)),
    brand("R", &["Regionalzug", "Regionaltog"], Some(Reg)),
    brand("IRX", &["Interregio Express"], Some(Reg)),
    brand("ER", &["EuroRegio"], Some(Reg)),
    brand("EX", &["Express"], Some(Reg)),
    brand("EXT", &["Extrazug"], Some(Reg)),
    brand("CJX", &["cityjet xpress"], Some(Reg)),
    brand("MEX", &["Metropolexpress"], Some(Reg)),
    brand("FEX", &["Flughafen-Express"], Some(Reg)),
    brand("TER", &["Train Express Regional"], Some(Reg)),
    brand("PE", &["Panorama Express"], Some(Reg)),
    brand("VAE", &["Voralpen-Express"], Some(Reg)),
    brand("SP", &["Spěšný vlak"], Some(Reg)),
    // German regional operators, alphabetical within the historical
    // grouping of the table.
    brand("ABR", &["ABELLIO Rail NRW GmbH"], Some(Reg)),
    brand("AG", &["Ahaus-Gronau"], Some(Reg)),
    brand("AKN", &["AKN Eisenbahn AG"], Some(Reg)),
    brand("ALX", &["alex", "Arriva-Länderbahn-Express"], Some(Reg)),
    brand("ATB", &["Autoschleuse Tauernbahn"], Some(Reg)),
    brand("ATZ", &["Autotunnelzug"], Some(Reg)),
    brand("BE", &["Bentheimer Eisenbahn"], Some(Reg)),
    brand("BLB", &["Berchtesgadener Land Bahn"], Some(Reg)),
    brand("BOB", &["Bayerische Oberlandbahn"], Some(Reg)),
    brand("BRB", &["Bayerische Regiobahn"], Some(Reg)),
    brand("BTE", &["BahnTouristikExpress"], Some(Reg)),
    brand("BZB", &["Bayerische Zugspitzbahn"], Some(Reg)),
    brand("CAN", &["cantus Verkehrsgesellschaft"], Some(Reg)),
    brand("CB", &["City Bahn", "City-Bahn"], Some(Reg)),
    brand("CBC", &["City-Bahn Chemnitz"], Some(Reg)),
    brand("CX", &["City Express"], Some(Reg)),
    brand("DAB", &["Daadetalbahn"], Some(Reg)),
    brand("DBG", &["Döllnitzbahn"], Some(Reg)),
    brand("DLB", &["Die Länderbahn"], Some(Reg)),
    brand("DPN", &["Nahreisezug"], Some(Reg)),
    brand("DWE", &["Dessau-Wörlitzer Eisenbahn"], Some(Reg)),
    brand("EB", &["Erfurter Bahn"], Some(Reg)),
    brand("EBx", &["Erfurter Bahn Express"], Some(Reg)),
    brand("EGP", &["Eisenbahngesellschaft Potsdam"], Some(Reg)),
    brand("EIB", &["Erfurter Industriebahn"], Some(Reg)),
    brand("ENO", &["enno"], Some(Reg)),
    brand("ERB", &["eurobahn"], Some(Reg)),
    brand("ERX", &["erixx"], Some(Reg)),
    brand("EVB", &["Eisenbahnen und Verkehrsbetriebe Elbe-Weser"], Some(Reg)),
    brand("FEG", &["Freiberger Eisenbahngesellschaft"], Some(Reg)),
    brand("GTW", &["Stadtbahn Gera"], Some(Reg)),
    brand("HANS", &["Hanseatische Eisenbahn"], Some(Reg)),
    brand("HEX", &["HarzElbeExpress"], Some(Reg)),
    brand("HLB", &["Hessische Landesbahn"], Some(Reg)),
    brand("HSB", &["Harzer Schmalspurbahnen"], Some(Reg)),
    brand("HTB", &["Hellertalbahn"], Some(Reg)),
    brand("HWB", &["Hochwaldbahn"], Some(Reg)),
    brand("HzL", &["Hohenzollerische Landesbahn"], Some(Reg)),
    brand("KD", &["Koleje Dolnośląskie"], Some(Reg)),
    brand("KM", &["Koleje Mazowieckie"], Some(Reg)),
    brand("KS", &["Koleje Śląskie"], Some(Reg)),
    brand("KTB", &["Kandertalbahn"], Some(Reg)),
    brand("KW", &["Koleje Wielkopolskie"], Some(Reg)),
    brand("LB", &["Lausitzbahn"], Some(Reg)),
    brand("M", &["Meridian"], Some(Reg)),
    brand("MBB", &["Mecklenburgische Bäderbahn Molli"], Some(Reg)),
    brand("ME", &["metronom", "Metronom"], Some(Reg)),
    brand("MEL", &["Museums-Eisenbahn Losheim"], Some(Reg)),
    brand("MEr", &["metronom regional"], Some(Reg)),
    brand("MR", &["Märkische Regiobahn"], Some(Reg)),
    brand("MRB", &["Mitteldeutsche Regiobahn"], Some(Reg)),
    brand("MSB", &["Mainschleifenbahn"], Some(Reg)),
    brand("MWB", &["Mittelweserbahn"], Some(Reg)),
    brand("NBE", &["Nordbahn Eisenbahngesellschaft"], Some(Reg)),
    brand("NEB", &["NEB Betriebsgesellschaft", "Niederbarnimer Eisenbahn"], Some(Reg)),
    brand("neg", &["Norddeutsche Eisenbahngesellschaft Niebüll"], Some(Reg)),
    brand("NOB", &["NordOstseeBahn"], Some(Reg)),
    brand("NWB", &["NordWestBahn"], Some(Reg)),
    brand("NX", &["National Express"], Some(Reg)),
    brand("OE", &["Ostdeutsche Eisenbahn"], Some(Reg)),
    brand("OLA", &["Ostseeland Verkehr"], Some(Reg)),
    brand("OPB", &["oberpfalzbahn"], Some(Reg)),
    brand("OS", &["Osobní vlak", "Osobny vlak"], Some(Reg)),
    brand("OSB", &["Ortenau-S-Bahn"], Some(Reg)),
    brand("P", &["P-Zug"], Some(Reg)),
    brand("PEG", &["Prignitzer Eisenbahn"], Some(Reg)),
    brand("PRE", &["Pressnitztalbahn"], Some(Reg)),
    brand("RBG", &["Regental Bahnbetriebs GmbH"], Some(Reg)),
    brand("RLB", &["Raaberbahn"], Some(Reg)),
    brand("RTB", &["Rurtalbahn"], Some(Reg)),
    brand("SBB", &["SBB GmbH", "Schweizerische Bundesbahnen"], Some(Reg)),
    brand("SBE", &["Sächsisch-Böhmische Eisenbahngesellschaft"], Some(Reg)),
    brand("SBS", &["Städtebahn Sachsen"], Some(Reg)),
    brand("SDG", &["Sächsische Dampfeisenbahngesellschaft"], Some(Reg)),
    brand("SE", &["Stadt-Express", "StadtExpress"], Some(Reg)),
    brand("SHB", &["Schleswig-Holstein-Bahn"], Some(Reg)),
    brand("SOB", &["Südostbayernbahn"], Some(Reg)),
    brand("SOE", &["Sächsisch-Oberlausitzer Eisenbahn"], Some(Reg)),
    brand("STB", &["Süd-Thüringen-Bahn"], Some(Reg)),
    brand("STX", &["Stern & Hafferl"], Some(Reg)),
    brand("SWE", &["Südwestdeutsche Verkehrs-AG"], Some(Reg)),
    brand("TLX", &["trilex", "Trilex"], Some(Reg)),
    brand("UBB", &["Usedomer Bäderbahn"], Some(Reg)),
    brand("VBG", &["Vogtlandbahn"], Some(Reg)),
    brand("VEB", &["Vulkan-Eifel-Bahn"], Some(Reg)),
    brand("VEC", &["vectus Verkehrsgesellschaft"], Some(Reg)),
    brand("VEN", &["Rhenus Veniro"], Some(Reg)),
    brand("VIA", &["VIAS GmbH"], Some(Reg)),
    brand("VLX", &["vlexx"], Some(Reg)),
    brand("VX", &["Vogtland-Express"], Some(Reg)),
    brand("WEG", &["Württembergische Eisenbahn-Gesellschaft"], Some(Reg)),
    brand("WFB", &["WestfalenBahn"], Some(Reg)),
    brand("WLE", &["Westfälische Landes-Eisenbahn"], Some(Reg)),
    brand("ZR", &["Zrýchlený vlak"], Some(Reg)),
    // Suburban operated as mot 0.
    brand("BSB", &["Breisgau-S-Bahn"], Some(Sub)),
    brand("RER", &["Réseau Express Régional"], Some(Sub)),
    brand("RS", &["Regio-S-Bahn"], Some(Sub)),
    brand("SKM", &["Szybka Kolej Miejska"], Some(Sub)),
    brand("SKW", &["Szybka Kolej Miejska Warszawa"], Some(Sub)),
    brand("SN", &["S-Bahn Nachtlinie"], Some(Sub)),
    brand("SWX", &["Schwäbische Waldbahn"], Some(Sub)),
    brand("WKD", &["Warszawska Kolej Dojazdowa"], Some(Sub)),
    brand("S", &["S-Bahn"], Some(Sub)),
    // Odd ones out.
    brand("STR", &["Straßenbahn"], Some(Tram)),
    brand("WTB", &["Waldenburgerbahn"], Some(Tram)),
    brand("SCH", &["Schauinslandbahn"], Some(Cablecar)),
    brand("GB", &["Gondelbahn"], Some(Cablecar)),
    brand("SEIL", &["Seilbahn"], Some(Cablecar)),
    brand("FAE", &["Fähre"], Some(Ferry)),
    brand("AST", &["Anruf-Sammel-Taxi"], Some(OnDemand)),
    brand("ALT", &["Anruf-Linien-Taxi"], Some(OnDemand)),
    brand("RFB", &["Rufbus"], Some(OnDemand)),
    // Historic / museum traffic rides in the rail bucket without a product.
    brand("MUS", &["Museumsbahn"], None),
    brand("DPF", &["Dampfzug"], None),
    brand("UUU", &["Unbekannter Zug"], None),
];

static NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("static pattern"));

/// Classify one raw field bundle into a [`Line`].
///
/// The cascade is deterministic and order-respecting: when an input
/// technically satisfies several rules, the earliest one decides.
pub fn classify(raw: &RawLine<'_>) -> Line {
    let mut line = match raw.mot {
        None => classify_without_mot(raw),
        Some("0") => classify_rail(raw),
        Some(mot) => classify_mot_bucket(mot, raw),
    };
    if line.network.is_none() {
        line.network = raw.network.map(str::to_owned);
    }
    if line.id.is_none() {
        line.id = raw.id.map(str::to_owned);
    }
    line
}

/// No mode code at all: the train name is the only signal.
fn classify_without_mot(raw: &RawLine<'_>) -> Line {
    let label = first_non_empty(&[raw.symbol, raw.name, raw.train_num]);
    match raw.train_name {
        Some("S-Bahn") => Line::new(Some(Sub), label),
        Some("U-Bahn") => Line::new(Some(Product::Subway), label),
        Some("Straßenbahn") => Line::new(Some(Tram), label),
        Some(
            "Bus" | "Stadtbus" | "Regionalbus" | "Fernbus" | "Nachtbus" | "Bürgerbus",
        ) => Line::new(Some(Bus), label),
        Some("Schienenersatzverkehr") => Line::new(
            Some(Bus),
            Some(format!("SEV{}", raw.train_num.unwrap_or(""))),
        ),
        Some("Anruf-Sammel-Taxi") => Line::new(Some(OnDemand), label),
        Some("Fähre" | "Schiff") => Line::new(Some(Ferry), label),
        _ => Line::new(None, label),
    }
}

/// Mode 0: the long-distance/regional rail bucket.
fn classify_rail(raw: &RawLine<'_>) -> Line {
    let train_type = raw.train_type.unwrap_or("");
    let train_name = raw.train_name.unwrap_or("");
    let train_num = raw.train_num.unwrap_or("");

    for rule in REPLACEMENT_RULES.iter().chain(RAIL_BRANDS) {
        let type_matches = !rule.code.is_empty() && train_type == rule.code;
        let name_matches = rule.names.contains(&train_name);
        if !(type_matches || name_matches) {
            continue;
        }
        if train_num.is_empty() && !rule.num_optional {
            continue;
        }
        return Line::new(rule.product, Some(format!("{}{}", rule.code, train_num)));
    }

    // Bare numeric symbols with no type/name carry no product information.
    if let Some(symbol) = raw.symbol
        && train_type.is_empty()
        && train_name.is_empty()
        && NUMERIC.is_match(symbol)
    {
        return Line::new(None, Some(symbol.to_string()));
    }

    if !train_type.is_empty() || !train_num.is_empty() {
        return Line::new(None, Some(format!("{train_type}{train_num}")));
    }

    Line::new(None, first_non_empty(&[raw.name, raw.symbol]))
}

/// Modes 1..=13, 17, 19: fixed per-bucket products.
fn classify_mot_bucket(mot: &str, raw: &RawLine<'_>) -> Line {
    let label = first_non_empty(&[raw.symbol, raw.name, raw.train_num]);
    match mot {
        "1" => Line::new(Some(Sub), label),
        "2" => Line::new(Some(Product::Subway), label),
        "3" | "4" => Line::new(Some(Tram), label),
        "5" | "6" | "7" => {
            if raw.train_name == Some("Schienenersatzverkehr")
                || raw.name == Some("Schienenersatzverkehr")
            {
                Line::new(Some(Bus), Some("SEV".into()))
            } else {
                Line::new(Some(Bus), label)
            }
        }
        "8" => Line::new(Some(Cablecar), label),
        "9" => Line::new(Some(Ferry), label),
        "10" => Line::new(Some(OnDemand), label),
        "12" | "13" => Line::new(Some(Reg), label),
        // 11, 17, 19: explicitly unclassified traffic.
        "11" | "17" | "19" => Line::new(None, label),
        _ => Line::new(None, label),
    }
}

fn first_non_empty(candidates: &[Option<&str>]) -> Option<String> {
    candidates
        .iter()
        .flatten()
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rail(train_type: &'static str, train_num: &'static str, train_name: &'static str) -> Line {
        classify(&RawLine {
            mot: Some("0"),
            train_type: Some(train_type),
            train_num: Some(train_num),
            train_name: Some(train_name),
            ..RawLine::default()
        })
    }

    #[test]
    fn high_speed_brands() {
        let line = rail("ICE", "75", "InterCityExpress");
        assert_eq!(line.product, Some(Product::HighSpeedTrain));
        assert_eq!(line.label.as_deref(), Some("ICE75"));

        assert_eq!(rail("TGV", "9576", "").label.as_deref(), Some("TGV9576"));
        assert_eq!(rail("RJ", "63", "railjet").product, Some(Product::HighSpeedTrain));
        assert_eq!(rail("FLX", "10", "FlixTrain").product, Some(Product::HighSpeedTrain));
    }

    #[test]
    fn name_matches_without_type() {
        let line = rail("", "2310", "EuroCity");
        assert_eq!(line.product, Some(Product::HighSpeedTrain));
        assert_eq!(line.label.as_deref(), Some("EC2310"));
    }

    #[test]
    fn regional_brands() {
        assert_eq!(rail("RE", "5", "Regional-Express").product, Some(Product::RegionalTrain));
        assert_eq!(rail("RE", "5", "Regional-Express").label.as_deref(), Some("RE5"));
        assert_eq!(rail("RB", "48", "Regionalbahn").label.as_deref(), Some("RB48"));
        assert_eq!(rail("ME", "3", "metronom").product, Some(Product::RegionalTrain));
        assert_eq!(rail("NWB", "75", "NordWestBahn").label.as_deref(), Some("NWB75"));
        assert_eq!(rail("ERB", "1", "eurobahn").product, Some(Product::RegionalTrain));
    }

    #[test]
    fn brands_across_networks() {
        assert_eq!(rail("AVE", "3103", "").product, Some(Product::HighSpeedTrain));
        assert_eq!(rail("EIP", "3508", "").product, Some(Product::HighSpeedTrain));
        assert_eq!(rail("", "7", "Lyntog").label.as_deref(), Some("LYN7"));
        assert_eq!(rail("TER", "72606", "").product, Some(Product::RegionalTrain));
        assert_eq!(rail("KM", "19", "Koleje Mazowieckie").product, Some(Product::RegionalTrain));
        assert_eq!(rail("NX", "4", "National Express").label.as_deref(), Some("NX4"));
        assert_eq!(rail("WKD", "1", "").product, Some(Product::SuburbanTrain));
        assert_eq!(rail("RFB", "595", "Rufbus").product, Some(Product::OnDemand));
        assert_eq!(rail("UUU", "104", "Unbekannter Zug").product, None);
    }

    #[test]
    fn cascade_precedence_holds() {
        // Satisfies the ICE rule by type and the IC rule by name; ICE comes
        // later in the table than EC/IC, but only one rule can match by
        // type — the name alone would select IC. Earlier entry wins.
        let line = rail("ICE", "690", "InterCity");
        assert_eq!(line.label.as_deref(), Some("IC690"));
        assert_eq!(line.product, Some(Product::HighSpeedTrain));

        // Replacement markers precede every brand: an RE-typed service
        // named Schienenersatzverkehr is a bus.
        let line = rail("RE", "11", "Schienenersatzverkehr");
        assert_eq!(line.product, Some(Product::Bus));
        assert_eq!(line.label.as_deref(), Some("SEV11"));
    }

    #[test]
    fn replacement_service_without_number() {
        let line = rail("SEV", "", "");
        assert_eq!(line.product, Some(Product::Bus));
        assert_eq!(line.label.as_deref(), Some("SEV"));
    }

    #[test]
    fn brand_requires_train_number() {
        // "IC" with no number cannot produce a label; falls through to the
        // concatenation fallback.
        let line = rail("IC", "", "");
        assert_eq!(line.product, None);
        assert_eq!(line.label.as_deref(), Some("IC"));
    }

    #[test]
    fn numeric_symbol_without_type_or_name() {
        let line = classify(&RawLine {
            mot: Some("0"),
            symbol: Some("118"),
            ..RawLine::default()
        });
        assert_eq!(line.product, None);
        assert_eq!(line.label.as_deref(), Some("118"));
    }

    #[test]
    fn unknown_rail_falls_back_to_concatenation() {
        let line = rail("XYZ", "77", "Zauberzug");
        assert_eq!(line.product, None);
        assert_eq!(line.label.as_deref(), Some("XYZ77"));
    }

    #[test]
    fn suburban_from_mot_1() {
        let line = classify(&RawLine {
            mot: Some("1"),
            symbol: Some("S2"),
            ..RawLine::default()
        });
        assert_eq!(line.product, Some(Product::SuburbanTrain));
        assert_eq!(line.label.as_deref(), Some("S2"));
    }

    #[test]
    fn mot_buckets() {
        let case = |mot: &'static str, symbol: &'static str| {
            classify(&RawLine {
                mot: Some(mot),
                symbol: Some(symbol),
                ..RawLine::default()
            })
        };
        assert_eq!(case("2", "U6").product, Some(Product::Subway));
        assert_eq!(case("3", "5").product, Some(Product::Tram));
        assert_eq!(case("4", "T1").product, Some(Product::Tram));
        assert_eq!(case("5", "42").product, Some(Product::Bus));
        assert_eq!(case("8", "1000").product, Some(Product::Cablecar));
        assert_eq!(case("9", "F1").product, Some(Product::Ferry));
        assert_eq!(case("10", "AST").product, Some(Product::OnDemand));
        assert_eq!(case("11", "X").product, None);
        assert_eq!(case("13", "R3").product, Some(Product::RegionalTrain));
    }

    #[test]
    fn bus_replacement_in_bus_bucket() {
        let line = classify(&RawLine {
            mot: Some("5"),
            name: Some("Schienenersatzverkehr"),
            ..RawLine::default()
        });
        assert_eq!(line.product, Some(Product::Bus));
        assert_eq!(line.label.as_deref(), Some("SEV"));
    }

    #[test]
    fn no_mot_uses_train_name_table() {
        let case = |train_name: &'static str, symbol: &'static str| {
            classify(&RawLine {
                train_name: Some(train_name),
                symbol: Some(symbol),
                ..RawLine::default()
            })
        };
        assert_eq!(case("S-Bahn", "S1").product, Some(Product::SuburbanTrain));
        assert_eq!(case("U-Bahn", "U2").product, Some(Product::Subway));
        assert_eq!(case("Regionalbus", "7280").product, Some(Product::Bus));
        assert_eq!(case("Fähre", "62").product, Some(Product::Ferry));
        assert_eq!(case("Mysteriumzug", "M1").product, None);
    }

    #[test]
    fn network_and_id_carried_through() {
        let line = classify(&RawLine {
            id: Some("vvs:20002"),
            network: Some("vvs"),
            mot: Some("1"),
            symbol: Some("S2"),
            ..RawLine::default()
        });
        assert_eq!(line.network.as_deref(), Some("vvs"));
        assert_eq!(line.id.as_deref(), Some("vvs:20002"));
    }

    #[test]
    fn deterministic() {
        let raw = RawLine {
            mot: Some("0"),
            train_type: Some("RE"),
            train_num: Some("1"),
            train_name: Some("Regional-Express"),
            ..RawLine::default()
        };
        assert_eq!(classify(&raw), classify(&raw));
    }
}
