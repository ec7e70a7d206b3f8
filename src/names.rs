//
// names.rs
// dicom-forge
//
// Synthetic name, institution and protocol tables used to populate generated studies.
//
// Thales Matheus Mendonça Santos - November 2025

use rand::{Rng, RngCore};

use crate::modality::{pick, Modality};

/// Share of patients who receive a French name.
pub const FRENCH_NAME_PROBABILITY: f64 = 0.20;

const ENGLISH_MALE: &[&str] = &[
    "James", "John", "Robert", "Michael", "William", "David", "Richard", "Joseph", "Thomas",
    "Charles", "Christopher", "Daniel", "Matthew", "Anthony", "Mark", "Donald", "Steven",
    "Paul", "Andrew", "Joshua", "Kenneth", "Kevin", "Brian", "George", "Edward", "Ronald",
];

const ENGLISH_FEMALE: &[&str] = &[
    "Mary", "Patricia", "Jennifer", "Linda", "Elizabeth", "Barbara", "Susan", "Jessica",
    "Sarah", "Karen", "Nancy", "Lisa", "Betty", "Margaret", "Sandra", "Ashley", "Kimberly",
    "Emily", "Donna", "Michelle", "Carol", "Amanda", "Melissa", "Deborah", "Laura", "Helen",
];

const ENGLISH_LAST: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Miller", "Davis", "Wilson", "Anderson",
    "Taylor", "Thomas", "Moore", "Jackson", "White", "Harris", "Clark", "Lewis", "Walker",
    "Hall", "Allen", "Young", "King", "Wright", "Scott", "Green", "Baker", "Adams", "Nelson",
    "Hill", "Campbell", "Mitchell", "Roberts", "Carter", "Phillips", "Evans", "Turner",
];

const FRENCH_MALE: &[&str] = &[
    "Jean", "Pierre", "Michel", "Philippe", "Alain", "Nicolas", "Christophe", "Laurent",
    "Frederic", "Julien", "Olivier", "Sebastien", "Thierry", "Antoine", "Mathieu", "Guillaume",
];

const FRENCH_FEMALE: &[&str] = &[
    "Marie", "Nathalie", "Isabelle", "Sylvie", "Catherine", "Martine", "Christine", "Sophie",
    "Valerie", "Sandrine", "Celine", "Aurelie", "Camille", "Juliette", "Chloe", "Manon",
];

const FRENCH_LAST: &[&str] = &[
    "Martin", "Bernard", "Dubois", "Thomas", "Robert", "Richard", "Petit", "Durand", "Leroy",
    "Moreau", "Simon", "Laurent", "Lefebvre", "Michel", "Garcia", "David", "Bertrand", "Roux",
    "Vincent", "Fournier", "Morel", "Girard", "Lambert", "Bonnet", "Dupont", "Fontaine",
];

const PHYSICIAN_FIRST: &[&str] = &[
    "Alice", "Benjamin", "Claire", "Daniel", "Eva", "Francois", "Grace", "Henri", "Irene",
    "Jacques", "Karen", "Louis", "Monica", "Nathan", "Olivia", "Paul",
];

const PHYSICIAN_LAST: &[&str] = &[
    "Armstrong", "Beaumont", "Chen", "Delacroix", "Edwards", "Fischer", "Gupta", "Hoffman",
    "Ibrahim", "Jensen", "Kowalski", "Lemaire", "Morgan", "Novak", "Okafor", "Patel",
];

const INSTITUTIONS: &[&str] = &[
    "Saint Mary Medical Center",
    "Riverside General Hospital",
    "Northgate University Hospital",
    "Hopital Saint-Louis",
    "Clinique du Parc",
    "Lakeview Imaging Center",
    "Mercy Regional Medical Center",
    "Centre Hospitalier de Lyon Sud",
];

pub const DEPARTMENTS: &[&str] = &[
    "Radiology",
    "Neuroradiology",
    "Emergency Radiology",
    "Interventional Radiology",
    "Musculoskeletal Imaging",
    "Body Imaging",
    "Breast Imaging",
    "Pediatric Radiology",
];

const INDICATIONS: &[&str] = &[
    "Follow-up",
    "Pain",
    "Trauma",
    "Suspected mass",
    "Pre-operative assessment",
    "Screening",
    "Post-operative control",
    "Inflammation",
];

/// Institution name with the department that performed the study.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Institution {
    pub name: String,
    pub department: String,
}

/// Patient name in `LAST^FIRST` form, matching the given sex (`F`, otherwise male tables).
pub fn patient_name(sex: &str, rng: &mut dyn RngCore) -> String {
    let french = rng.gen_bool(FRENCH_NAME_PROBABILITY);
    let (male, female, last) = if french {
        (FRENCH_MALE, FRENCH_FEMALE, FRENCH_LAST)
    } else {
        (ENGLISH_MALE, ENGLISH_FEMALE, ENGLISH_LAST)
    };
    let first = if sex == "F" {
        pick(female, rng)
    } else {
        pick(male, rng)
    };
    let last = pick(last, rng);
    format!("{}^{}", last.to_uppercase(), first.to_uppercase())
}

pub fn physician_name(rng: &mut dyn RngCore) -> String {
    let last = pick(PHYSICIAN_LAST, rng);
    let first = pick(PHYSICIAN_FIRST, rng);
    format!("{}^{}^^Dr", last.to_uppercase(), first.to_uppercase())
}

pub fn institution(rng: &mut dyn RngCore) -> Institution {
    Institution {
        name: pick(INSTITUTIONS, rng).to_string(),
        department: pick(DEPARTMENTS, rng).to_string(),
    }
}

pub fn body_parts(modality: Modality) -> &'static [&'static str] {
    match modality {
        Modality::Mr => &["BRAIN", "SPINE", "KNEE", "SHOULDER", "PELVIS", "ABDOMEN"],
        Modality::Ct => &["HEAD", "CHEST", "ABDOMEN", "PELVIS", "SPINE"],
        Modality::Cr | Modality::Dx => &["CHEST", "HAND", "KNEE", "FOOT", "SPINE", "PELVIS"],
        Modality::Us => &["ABDOMEN", "PELVIS", "NECK", "HEART", "KIDNEY"],
        Modality::Mg => &["BREAST"],
    }
}

pub fn body_part(modality: Modality, rng: &mut dyn RngCore) -> String {
    pick(body_parts(modality), rng).to_string()
}

pub fn station_name(modality: Modality, rng: &mut dyn RngCore) -> String {
    format!("{}{:02}", modality.as_str(), rng.gen_range(1..=20))
}

pub fn protocol_name(modality: Modality, body_part: &str, rng: &mut dyn RngCore) -> String {
    let variants: &[&str] = match modality {
        Modality::Mr => &["ROUTINE", "WITH CONTRAST", "WITHOUT CONTRAST", "DIFFUSION"],
        Modality::Ct => &["ROUTINE", "WITH CONTRAST", "LOW DOSE", "ANGIO"],
        Modality::Cr | Modality::Dx => &["2 VIEWS", "STANDARD", "WEIGHT BEARING"],
        Modality::Us => &["ROUTINE", "DOPPLER", "FOCUSED"],
        Modality::Mg => &["SCREENING", "DIAGNOSTIC", "TOMOSYNTHESIS"],
    };
    format!("{} {} {}", modality.as_str(), body_part, pick(variants, rng))
}

pub fn clinical_indication(body_part: &str, rng: &mut dyn RngCore) -> String {
    format!("{} - {}", pick(INDICATIONS, rng), body_part.to_lowercase())
}

/// Default study description when none is configured.
pub fn study_description(
    modality: Modality,
    body_part: &str,
    study: usize,
    studies: usize,
) -> String {
    if studies > 1 {
        format!("{} {} - Study {}", modality.as_str(), body_part, study)
    } else {
        format!("{} {}", modality.as_str(), body_part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn patient_names_use_dicom_person_name_form() {
        let mut rng = StdRng::seed_from_u64(10);
        for _ in 0..100 {
            let name = patient_name("F", &mut rng);
            let (last, first) = name.split_once('^').unwrap();
            assert!(!last.is_empty() && !first.is_empty());
            assert_eq!(name, name.to_uppercase());
        }
    }

    #[test]
    fn french_names_appear_at_roughly_the_configured_rate() {
        let mut rng = StdRng::seed_from_u64(99);
        let french_last: Vec<String> = FRENCH_LAST.iter().map(|s| s.to_uppercase()).collect();
        let english_last: Vec<String> = ENGLISH_LAST.iter().map(|s| s.to_uppercase()).collect();
        let mut french = 0;
        let trials = 2000;
        for _ in 0..trials {
            let name = patient_name("M", &mut rng);
            let last = name.split('^').next().unwrap().to_string();
            // "THOMAS" exists in both tables
            if french_last.contains(&last) && !english_last.contains(&last) {
                french += 1;
            }
        }
        let rate = french as f64 / trials as f64;
        assert!(rate > 0.12 && rate < 0.26, "rate {rate}");
    }

    #[test]
    fn mammography_is_always_breast() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(body_part(Modality::Mg, &mut rng), "BREAST");
        for modality in Modality::ALL {
            assert!(!body_parts(modality).is_empty());
        }
    }

    #[test]
    fn descriptions_number_studies_only_when_several() {
        assert_eq!(study_description(Modality::Ct, "CHEST", 1, 1), "CT CHEST");
        assert_eq!(
            study_description(Modality::Mr, "BRAIN", 2, 3),
            "MR BRAIN - Study 2"
        );
    }

    #[test]
    fn station_names_carry_modality_code() {
        let mut rng = StdRng::seed_from_u64(4);
        assert!(station_name(Modality::Us, &mut rng).starts_with("US"));
        assert!(protocol_name(Modality::Ct, "HEAD", &mut rng).starts_with("CT HEAD "));
    }
}
