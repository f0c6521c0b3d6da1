use serde::Deserialize;

use saldo_core::{CategorizedRecord, Category, CategoryId, Confidence, UserRule, ValidRecord};

/// Ordered keyword lists used as the last categorization tier. The first
/// category with a keyword contained in the description wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordDictionary {
    entries: Vec<KeywordEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeywordEntry {
    pub name: String,
    pub keywords: Vec<String>,
}

#[derive(Deserialize)]
struct KeywordFile {
    #[serde(default)]
    category: Vec<KeywordEntry>,
}

const BUILTIN: &[(&str, &[&str])] = &[
    (
        "Compras",
        &["amazon", "mercado livre", "mercadolivre", "shopee", "shein", "magalu", "aliexpress"],
    ),
    (
        "Alimentação",
        &[
            "ifood", "uber eats", "rappi", "restaurante", "padaria", "supermercado", "mercado",
            "mcdonalds", "mc donalds", "burger king", "lanchonete", "acougue", "açougue",
            "hortifruti", "pizzaria",
        ],
    ),
    (
        "Transporte",
        &[
            "uber", "99app", "99 pop", "taxi", "táxi", "posto", "combustivel", "combustível",
            "gasolina", "estacionamento", "pedagio", "pedágio", "metro", "metrô", "onibus",
            "ônibus",
        ],
    ),
    (
        "Saúde",
        &[
            "farmacia", "farmácia", "drogaria", "droga raia", "drogasil", "hospital", "clinica",
            "clínica", "laboratorio", "laboratório", "dentista", "unimed",
        ],
    ),
    (
        "Lazer",
        &["netflix", "spotify", "cinema", "teatro", "ingresso", "steam", "playstation", "disney+"],
    ),
    ("Moradia", &["aluguel", "condominio", "condomínio", "iptu"]),
    (
        "Serviços",
        &[
            "energia", "eletropaulo", "enel", "sabesp", "saneamento", "internet", "telefone",
            "celular", "vivo", "claro",
        ],
    ),
    (
        "Educação",
        &["curso", "udemy", "alura", "escola", "faculdade", "universidade", "livraria"],
    ),
    ("Vestuário", &["renner", "riachuelo", "zara", "c&a", "roupa", "calcados", "calçados"]),
];

impl Default for KeywordDictionary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KeywordDictionary {
    pub fn new(entries: Vec<KeywordEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| KeywordEntry {
                name: e.name,
                keywords: e
                    .keywords
                    .into_iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();
        Self { entries }
    }

    pub fn builtin() -> Self {
        Self::new(
            BUILTIN
                .iter()
                .map(|(name, keywords)| KeywordEntry {
                    name: name.to_string(),
                    keywords: keywords.iter().map(|k| k.to_string()).collect(),
                })
                .collect(),
        )
    }

    /// Reads `[[category]]` tables with `name` and `keywords`, in file order.
    pub fn from_toml(toml_content: &str) -> Result<Self, String> {
        let file: KeywordFile =
            toml::from_str(toml_content).map_err(|e| format!("Failed to parse TOML: {e}"))?;
        Ok(Self::new(file.category))
    }

    /// Category name for an already lowercased description.
    pub fn lookup(&self, description: &str) -> Option<&str> {
        let text = description.to_lowercase();
        self.entries
            .iter()
            .find(|e| e.keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|e| e.name.as_str())
    }
}

/// What the cascade decided for one description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub category_id: Option<CategoryId>,
    pub confidence: Confidence,
    pub name: Option<String>,
}

impl Suggestion {
    fn none() -> Self {
        Suggestion {
            category_id: None,
            confidence: Confidence::None,
            name: None,
        }
    }

    fn from_category(category: &Category, confidence: Confidence) -> Self {
        Suggestion {
            category_id: Some(category.id),
            confidence,
            name: Some(category.name.clone()),
        }
    }
}

/// Tiered categorization against one user's categories and rules.
///
/// Tiers, first hit wins: exact label, partial label, user rule, keyword
/// dictionary. Labels only exist for aggregator records.
pub struct Categorizer {
    categories: Vec<Category>,
    rules: Vec<UserRule>,
    keywords: KeywordDictionary,
}

impl Categorizer {
    pub fn new(categories: Vec<Category>, mut rules: Vec<UserRule>, keywords: KeywordDictionary) -> Self {
        // Highest priority first; ties keep their given order.
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            categories,
            rules,
            keywords,
        }
    }

    pub fn suggest(&self, description: &str, label: Option<&str>) -> Suggestion {
        if let Some(label) = label.map(|l| l.trim().to_lowercase()).filter(|l| !l.is_empty()) {
            if let Some(found) = self.categories.iter().find(|c| c.name.trim().to_lowercase() == label) {
                return Suggestion::from_category(found, Confidence::Exact);
            }
            let partial = self.categories.iter().find(|c| {
                let name = c.name.trim().to_lowercase();
                !name.is_empty() && (name.contains(&label) || label.contains(&name))
            });
            if let Some(found) = partial {
                return Suggestion::from_category(found, Confidence::Partial);
            }
        }

        let text = description.to_lowercase();
        let rule = self.rules.iter().find(|r| {
            let pattern = r.pattern.trim().to_lowercase();
            !pattern.is_empty() && text.contains(&pattern)
        });
        if let Some(rule) = rule {
            return Suggestion {
                category_id: Some(rule.category_id),
                confidence: Confidence::Exact,
                name: self
                    .categories
                    .iter()
                    .find(|c| c.id == rule.category_id)
                    .map(|c| c.name.clone()),
            };
        }

        if let Some(name) = self.keywords.lookup(&text) {
            let resolved = self
                .categories
                .iter()
                .find(|c| c.name.to_lowercase() == name.to_lowercase());
            return Suggestion {
                category_id: resolved.map(|c| c.id),
                confidence: Confidence::Keyword,
                name: Some(name.to_string()),
            };
        }

        Suggestion::none()
    }

    pub fn categorize(&self, record: ValidRecord) -> CategorizedRecord {
        let suggestion = self.suggest(record.description(), record.record.category_label.as_deref());
        CategorizedRecord {
            record,
            category_id: suggestion.category_id,
            confidence: suggestion.confidence,
            suggested_category: suggestion.name,
        }
    }

    pub fn categorize_all(&self, records: Vec<ValidRecord>) -> Vec<CategorizedRecord> {
        records.into_iter().map(|r| self.categorize(r)).collect()
    }
}

/// One-shot categorization with the built-in keyword dictionary.
pub fn categorize(record: ValidRecord, categories: &[Category], rules: &[UserRule]) -> CategorizedRecord {
    Categorizer::new(categories.to_vec(), rules.to_vec(), KeywordDictionary::builtin()).categorize(record)
}
