//! Household meal-planning shapes exchanged with the model.
//!
//! Field names serialize in camelCase. Replies produced by prompts written
//! for the French-language app use French keys (`nom`, `quantite`,
//! `magasinSuggere`, ...); those are accepted as aliases on input.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point on the map, optionally with a postal address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, alias = "adresse", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, alias = "ville", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, alias = "codePostal", skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, alias = "pays", skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            address: None,
            city: None,
            postal_code: None,
            country: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "nom")]
    pub name: String,
    #[serde(default, alias = "categorie", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, alias = "localisation", skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    #[serde(alias = "nom")]
    pub name: String,
    #[serde(default, alias = "quantite")]
    pub quantity: f64,
    #[serde(default, alias = "unite")]
    pub unit: String,
    #[serde(default, alias = "categorie", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, alias = "perissable")]
    pub perishable: bool,
    #[serde(default, alias = "datePeremption", skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
}

impl Ingredient {
    pub fn new(name: impl Into<String>, quantity: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit: unit.into(),
            category: None,
            perishable: false,
            expiry_date: None,
        }
    }
}

/// Per-member settings that steer generated suggestions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPreferences {
    /// 0 (none) to 5 (very hot)
    #[serde(default, alias = "niveauEpices")]
    pub spice_level: u8,
    #[serde(default, alias = "apportCaloriqueCible")]
    pub target_calories: u32,
    #[serde(default, alias = "cuisinesPreferees")]
    pub preferred_cuisines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMember {
    pub id: String,
    #[serde(alias = "prenom")]
    pub first_name: String,
    #[serde(default, alias = "nom")]
    pub last_name: String,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default, alias = "preferencesAlimentaires")]
    pub dietary_preferences: Vec<String>,
    #[serde(default, alias = "restrictionsMedicales")]
    pub medical_restrictions: Vec<String>,
    #[serde(default)]
    pub ai_preferences: AiPreferences,
}

impl FamilyMember {
    pub fn new(id: impl Into<String>, first_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            first_name: first_name.into(),
            last_name: String::new(),
            allergies: Vec::new(),
            dietary_preferences: Vec::new(),
            medical_restrictions: Vec::new(),
            ai_preferences: AiPreferences::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[serde(alias = "facile")]
    Easy,
    #[serde(alias = "moyen")]
    Medium,
    #[serde(alias = "difficile")]
    Hard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    #[serde(alias = "nom")]
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
    #[serde(default)]
    pub instructions: String,
    /// Minutes
    #[serde(default, alias = "tempsPreparation")]
    pub preparation_time: u32,
    /// Minutes
    #[serde(default, alias = "tempsCuisson", skip_serializing_if = "Option::is_none")]
    pub cooking_time: Option<u32>,
    #[serde(default = "one", alias = "portions")]
    pub servings: u32,
    #[serde(default, alias = "categorie", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, alias = "difficulte", skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Menu {
    pub date: String,
    /// Breakfast, lunch, dinner, ...
    #[serde(alias = "typeRepas")]
    pub meal_type: String,
    #[serde(default, alias = "recettes")]
    pub recipes: Vec<Recipe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "coutEstime", skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingItem {
    #[serde(alias = "nom")]
    pub name: String,
    #[serde(alias = "quantite")]
    pub quantity: f64,
    #[serde(default, alias = "unite")]
    pub unit: String,
    #[serde(
        default,
        alias = "magasinSuggere",
        alias = "magasinSuggeré",
        skip_serializing_if = "Option::is_none"
    )]
    pub suggested_store: Option<String>,
}

/// Whether a recipe works for one family member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Suitability {
    #[serde(alias = "adapté", alias = "adapte")]
    Suitable,
    #[serde(alias = "non adapté", alias = "non adapte")]
    Unsuitable,
    /// Suitable once adjusted (ingredient swap, milder spices, ...)
    #[serde(alias = "modifié", alias = "modifie")]
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeAnalysis {
    pub calories: f64,
    #[serde(default, alias = "spicesLevel", alias = "niveauEpices")]
    pub spice_level: u8,
    /// Keyed by [`FamilyMember::id`]
    #[serde(default)]
    pub suitability: BTreeMap<String, Suitability>,
}

/// Filters for recipe suggestions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipePreferences {
    #[serde(alias = "niveauEpices")]
    pub spice_level: u8,
    #[serde(default, alias = "cuisinesPreferees")]
    pub preferred_cuisines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_type: Option<String>,
}
