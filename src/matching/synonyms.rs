use std::collections::{HashMap, HashSet};

use crate::matching::normalizer::normalize;

/// Static synonym and morphology tables consulted by the matcher.
///
/// Three kinds of knowledge live here:
/// - `fallback`: normalized variant -> exact database name ("pomodori" ->
///   "Pomodoro"), checked before any semantic search.
/// - `index_variants`: canonical normalized name -> spelling variants, used
///   only to enrich the search index at build time.
/// - `invariable` / `always_plural`: words the singular/plural heuristic must
///   leave alone ("latte" never pluralizes, "ceci" is already plural).
///
/// The table is constructed explicitly and injected into the matcher, so a
/// deployment can swap in its own vocabulary and tests stay deterministic.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    fallback: HashMap<String, String>,
    index_variants: HashMap<String, Vec<String>>,
    invariable: HashSet<String>,
    always_plural: HashSet<String>,
}

impl SynonymTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Maps a normalized variant spelling to the exact database name.
    pub fn add_fallback(&mut self, variant: &str, db_name: &str) {
        self.fallback.insert(normalize(variant), db_name.to_string());
    }

    /// Registers spelling variants for a canonical name, used to enrich the
    /// semantic index at build time.
    pub fn add_index_variants(&mut self, canonical: &str, variants: &[&str]) {
        let entry = self
            .index_variants
            .entry(normalize(canonical))
            .or_default();
        for v in variants {
            entry.push(normalize(v));
        }
    }

    pub fn mark_invariable(&mut self, word: &str) {
        self.invariable.insert(normalize(word));
    }

    pub fn mark_always_plural(&mut self, word: &str) {
        self.always_plural.insert(normalize(word));
    }

    /// Exact database name for a normalized variant, if the table knows one.
    pub fn canonical_for(&self, normalized_name: &str) -> Option<&str> {
        self.fallback.get(normalized_name).map(String::as_str)
    }

    /// Variants registered for index enrichment, keyed by canonical
    /// normalized name.
    pub fn variants_for_index(&self, normalized_name: &str) -> &[String] {
        self.index_variants
            .get(normalized_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Plural spellings derived from the Italian noun endings, for index
    /// enrichment ("carota" -> "carote", "peperone" -> "peperoni").
    /// Names guarded by the invariable/always-plural word lists get none.
    pub fn plural_variants(&self, normalized_name: &str) -> Vec<String> {
        if self.is_morphologically_fixed(normalized_name) {
            return Vec::new();
        }
        let mut variants = Vec::new();
        if let Some(stem) = normalized_name.strip_suffix('e') {
            variants.push(format!("{stem}i"));
        } else if let Some(stem) = normalized_name.strip_suffix('a') {
            variants.push(format!("{stem}e"));
        } else if let Some(stem) = normalized_name.strip_suffix('o') {
            variants.push(format!("{stem}i"));
        }
        variants
    }

    /// Query-time fallback: a plural-looking name ("gamberi") yields its
    /// singular form ("gambero") for a relaxed second search. Returns `None`
    /// when the name does not end in the plural suffix or the word lists say
    /// the form is fixed.
    pub fn singular_candidate(&self, normalized_name: &str) -> Option<String> {
        if normalized_name.len() < 2 || self.is_morphologically_fixed(normalized_name) {
            return None;
        }
        normalized_name
            .strip_suffix('i')
            .map(|stem| format!("{stem}o"))
    }

    fn is_morphologically_fixed(&self, normalized_name: &str) -> bool {
        if self.invariable.contains(normalized_name)
            || self.always_plural.contains(normalized_name)
        {
            return true;
        }
        // Multi-word names are judged by their last word ("funghi porcini").
        match normalized_name.rsplit(' ').next() {
            Some(last) => {
                self.invariable.contains(last) || self.always_plural.contains(last)
            }
            None => false,
        }
    }

    /// The built-in Italian vocabulary used by the default deployment.
    pub fn default_italian() -> Self {
        let mut table = Self::empty();

        for word in [
            "latte", "pepe", "formaggio", "sale", "olio", "aceto", "caffè", "tè",
            "miele", "marmellata", "pane", "cous cous", "curry", "senape",
            "maionese", "ketchup", "wasabi", "miglio", "quinoa", "orzo", "burro",
            "farro", "yogurt", "riso", "grano", "semola", "amido", "zucchero",
            "farina", "mais", "lievito", "brodo", "concentrato di pomodoro",
            "passata di pomodoro", "pelati", "acqua", "lattuga",
        ] {
            table.mark_invariable(word);
        }

        for word in [
            "olive", "alici", "acciughe", "anacardi", "arachidi", "capperi",
            "rognoni", "marsala", "funghi", "spinaci", "asparagi", "lenticchie",
            "fagioli", "ceci", "piselli", "pinoli", "pistacchi", "mandorle",
            "noci", "nocciole", "datteri", "fichi", "prugne", "uvetta",
            "albicocche", "molluschi", "frutti di mare", "gamberetti", "cozze",
            "vongole", "calamari", "seppie", "broccoli",
        ] {
            table.mark_always_plural(word);
        }

        table.add_index_variants("couscous", &["cuscus"]);
        table.add_index_variants("linguine", &["pasta linguine"]);
        table.add_index_variants(
            "peperoni",
            &[
                "peperone",
                "peperone dolce",
                "peperone rosso",
                "peperone giallo",
                "peperoni rossi",
                "peperoni gialli",
            ],
        );
        table.add_index_variants("gamberi", &["gambero", "gamberetto", "gamberetti"]);
        table.add_index_variants("basilico", &["basilico fresco", "foglie di basilico fresco"]);
        table.add_index_variants("menta", &["menta fresca", "foglie di menta"]);
        table.add_index_variants("coriandolo", &["coriandolo fresco", "cilantro"]);
        table.add_index_variants("melanzane", &["melanzana"]);
        table.add_index_variants(
            "mandorle",
            &["mandorle a scaglie", "mandorle a lamelle", "mandorle tritate"],
        );
        table.add_index_variants("pancetta", &["pancetta a cubetti"]);
        table.add_index_variants("pecorino", &["pecorino grattugiato", "pecorino romano grattugiato"]);
        table.add_index_variants("cetriolo", &["cetrioli", "cetriolo a cubetti"]);
        table.add_index_variants(
            "limone",
            &["limoni", "scorza di limone", "scorza di limone grattugiata", "lime"],
        );
        table.add_index_variants("vino bianco", &["vino bianco secco"]);
        table.add_index_variants("cipolla", &["cipolla rossa", "cipolla bianca", "cipolla dorata"]);
        table.add_index_variants(
            "parmigiano reggiano",
            &["parmigiano", "formaggio parmigiano", "parmigiano grattugiato"],
        );
        table.add_index_variants("spaghetti", &["pasta spaghetti", "pasta"]);
        table.add_index_variants("penne", &["pasta penne", "pasta"]);
        table.add_index_variants("fusilli", &["pasta fusilli", "pasta"]);
        table.add_index_variants("tagliatelle", &["pasta tagliatelle"]);
        table.add_index_variants("riso basmati", &["riso", "riso bianco"]);
        table.add_index_variants("riso arborio", &["riso", "riso bianco"]);
        table.add_index_variants(
            "pomodoro",
            &["pomodori", "pomodoro fresco", "pomodori freschi", "pomodoro a cubetti"],
        );
        table.add_index_variants("funghi", &["funghi champignon", "funghi porcini", "champignon"]);
        table.add_index_variants("mirtilli", &["mirtilli rossi"]);
        table.add_index_variants("uvetta", &["uvetta sultanina", "uvetta comune"]);
        table.add_index_variants("zucchine", &["zucchina"]);
        table.add_index_variants("mela", &["mele"]);
        table.add_index_variants("pera", &["pere"]);
        table.add_index_variants("arancia", &["arance"]);
        table.add_index_variants("fragole", &["fragola"]);
        table.add_index_variants("uva", &["uva bianca", "uva nera", "uva rossa"]);
        table.add_index_variants("banana", &["banane"]);
        table.add_index_variants("rosmarino", &["rosmarino fresco"]);
        table.add_index_variants("timo", &["timo fresco"]);
        table.add_index_variants("origano", &["origano secco", "origano fresco"]);
        table.add_index_variants("polpo", &["polipo"]);
        table.add_index_variants("rucola", &["rughetta", "rucola fresca"]);
        table.add_index_variants("feta", &["feta a cubetti", "formaggio feta"]);
        table.add_index_variants("zafferano", &["zafferano in polvere"]);
        table.add_index_variants(
            "prezzemolo",
            &["prezzemolo fresco", "prezzemolo in polvere", "prezzemolo secco"],
        );
        table.add_index_variants("lenticchie", &["lenticchie rosse", "lenticchie verdi"]);

        table.add_fallback("pomodori", "Pomodoro");
        table.add_fallback("pomodoro fresco", "Pomodoro");
        table.add_fallback("pomodori freschi", "Pomodoro");
        table.add_fallback("pomodoro a cubetti", "Pomodoro");
        table.add_fallback("pomodori a cubetti", "Pomodoro");
        table.add_fallback("peperone", "Peperoni");
        table.add_fallback("peperone rosso", "Peperoni");
        table.add_fallback("pecorino grattugiato", "Pecorino");
        table.add_fallback("pecorino romano grattugiato", "Pecorino");
        table.add_fallback("pancetta a cubetti", "Pancetta");
        table.add_fallback("cetrioli", "Cetriolo");
        table.add_fallback("cetriolo a cubetti", "Cetriolo");
        table.add_fallback("cetrioli a cubetti", "Cetriolo");
        table.add_fallback("feta a cubetti", "Feta");
        table.add_fallback("mandorle a scaglie", "Mandorle");
        table.add_fallback("mandorle a lamelle", "Mandorle");
        table.add_fallback("mandorle a fette", "Mandorle");
        table.add_fallback("mandorle tritate", "Mandorle");
        table.add_fallback("tagliolini", "Tagliatelle");
        table.add_fallback("tagliolini freschi", "Tagliatelle");
        table.add_fallback("rucola fresca", "Rucola");
        table.add_fallback("rughetta", "Rucola");
        table.add_fallback("cipolla rossa", "Cipolla");
        table.add_fallback("cipolla bianca", "Cipolla");
        table.add_fallback("cipolla dorata", "Cipolla");
        table.add_fallback("zucchina", "Zucchine");
        table.add_fallback("zucchini", "Zucchine");
        table.add_fallback("pepe", "Pepe nero");
        table.add_fallback("coriandolo fresco", "Coriandolo");
        table.add_fallback("origano fresco", "Origano");
        table.add_fallback("origano secco", "Origano");
        table.add_fallback("mirtilli rossi", "Mirtilli");
        table.add_fallback("prezzemolo fresco", "Prezzemolo");
        table.add_fallback("zenzero fresco", "Zenzero");
        table.add_fallback("zenzero fresco grattugiato", "Zenzero");
        table.add_fallback("limoni", "Limone");
        table.add_fallback("scorza di limone", "Limone");
        table.add_fallback("scorza di limone grattugiata", "Limone");
        table.add_fallback("lime", "Limone");
        table.add_fallback("uvetta sultanina", "Uvetta");
        table.add_fallback("vino bianco secco", "Vino bianco");

        table
    }
}
