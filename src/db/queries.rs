pub const PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

pub const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
  id          INTEGER PRIMARY KEY AUTOINCREMENT,
  name        TEXT NOT NULL,
  email       TEXT NOT NULL UNIQUE,
  role        TEXT NOT NULL DEFAULT 'student' CHECK (role IN ('admin', 'trainer', 'student')),
  is_active   INTEGER NOT NULL DEFAULT 1,
  created_at  INTEGER NOT NULL
);
"#;

pub const CREATE_CATEGORIES: &str = r#"
CREATE TABLE IF NOT EXISTS categories (
  id          INTEGER PRIMARY KEY AUTOINCREMENT,
  name        TEXT NOT NULL UNIQUE,
  created_at  INTEGER NOT NULL
);
"#;

pub const CREATE_EXERCISES: &str = r#"
CREATE TABLE IF NOT EXISTS exercises (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  name            TEXT NOT NULL,
  description     TEXT,
  duration        INTEGER NOT NULL,
  intensity       TEXT NOT NULL DEFAULT 'medium',
  work_type       TEXT NOT NULL DEFAULT 'technique',
  difficulty      TEXT NOT NULL DEFAULT 'intermediate',
  tags            TEXT NOT NULL DEFAULT '[]',
  materials       TEXT NOT NULL DEFAULT '[]',
  protection      TEXT NOT NULL DEFAULT '[]',
  instructions    TEXT NOT NULL DEFAULT '[]',
  video_url       TEXT,
  image_url       TEXT,
  is_multi_timer  INTEGER NOT NULL DEFAULT 0,
  timers          TEXT NOT NULL DEFAULT '[]',
  is_template     INTEGER NOT NULL DEFAULT 0,
  is_active       INTEGER NOT NULL DEFAULT 1,
  visibility      TEXT NOT NULL DEFAULT 'private',
  created_by      INTEGER NOT NULL REFERENCES users(id),
  usage_count     INTEGER NOT NULL DEFAULT 0,
  average_rating  REAL,
  created_at      INTEGER NOT NULL,
  updated_at      INTEGER NOT NULL
);
"#;

pub const CREATE_EXERCISE_CATEGORIES: &str = r#"
CREATE TABLE IF NOT EXISTS exercise_categories (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  exercise_id  INTEGER NOT NULL REFERENCES exercises(id) ON DELETE CASCADE,
  category_id  INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
  UNIQUE (exercise_id, category_id)
);
"#;

pub const CREATE_ROUTINES: &str = r#"
CREATE TABLE IF NOT EXISTS routines (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  name            TEXT NOT NULL,
  description     TEXT,
  objective       TEXT,
  total_duration  REAL NOT NULL DEFAULT 0,
  difficulty      TEXT NOT NULL DEFAULT 'intermediate',
  level           TEXT NOT NULL DEFAULT 'intermedio',
  tags            TEXT NOT NULL DEFAULT '[]',
  materials       TEXT NOT NULL DEFAULT '[]',
  protection      TEXT NOT NULL DEFAULT '[]',
  is_template     INTEGER NOT NULL DEFAULT 0,
  is_favorite     INTEGER NOT NULL DEFAULT 0,
  visibility      TEXT NOT NULL DEFAULT 'private',
  is_active       INTEGER NOT NULL DEFAULT 1,
  repeat_in_days  INTEGER NOT NULL DEFAULT 0,
  scheduled_days  TEXT NOT NULL DEFAULT '[]',
  trainer_notes   TEXT,
  created_by      INTEGER NOT NULL REFERENCES users(id),
  usage_count     INTEGER NOT NULL DEFAULT 0,
  average_rating  REAL,
  created_at      INTEGER NOT NULL,
  updated_at      INTEGER NOT NULL
);
"#;

pub const CREATE_ROUTINE_CATEGORIES: &str = r#"
CREATE TABLE IF NOT EXISTS routine_categories (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  routine_id   INTEGER NOT NULL REFERENCES routines(id) ON DELETE CASCADE,
  category_id  INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
  UNIQUE (routine_id, category_id)
);
"#;

pub const CREATE_ROUTINE_BLOCKS: &str = r#"
CREATE TABLE IF NOT EXISTS routine_blocks (
  id           INTEGER PRIMARY KEY AUTOINCREMENT,
  routine_id   INTEGER NOT NULL REFERENCES routines(id) ON DELETE CASCADE,
  name         TEXT NOT NULL,
  description  TEXT,
  color        TEXT NOT NULL DEFAULT '#3B82F6',
  notes        TEXT,
  sort_order   INTEGER NOT NULL,
  duration     REAL NOT NULL DEFAULT 0,
  created_at   INTEGER NOT NULL,
  updated_at   INTEGER NOT NULL,
  UNIQUE (routine_id, sort_order)
);
"#;

pub const CREATE_ROUTINE_BLOCK_EXERCISES: &str = r#"
CREATE TABLE IF NOT EXISTS routine_block_exercises (
  id                 INTEGER PRIMARY KEY AUTOINCREMENT,
  routine_block_id   INTEGER NOT NULL REFERENCES routine_blocks(id) ON DELETE CASCADE,
  exercise_id        INTEGER NOT NULL REFERENCES exercises(id) ON DELETE RESTRICT,
  sort_order         INTEGER NOT NULL,
  duration_override  INTEGER,
  notes              TEXT NOT NULL DEFAULT '[]',
  custom_timers      TEXT,
  UNIQUE (routine_block_id, sort_order),
  UNIQUE (routine_block_id, exercise_id)
);
"#;

pub const CREATE_ROUTINE_COMPLETIONS: &str = r#"
CREATE TABLE IF NOT EXISTS routine_completions (
  id                    INTEGER PRIMARY KEY AUTOINCREMENT,
  routine_id            INTEGER NOT NULL REFERENCES routines(id) ON DELETE RESTRICT,
  routine_name          TEXT NOT NULL,
  category_id           INTEGER REFERENCES categories(id) ON DELETE SET NULL,
  category_name         TEXT,
  completed_at          INTEGER NOT NULL,
  planned_duration      REAL NOT NULL,
  actual_duration       INTEGER NOT NULL,
  notes                 TEXT NOT NULL DEFAULT '[]',
  rating                INTEGER CHECK (rating BETWEEN 1 AND 5),
  morning_session       INTEGER NOT NULL DEFAULT 0,
  afternoon_session     INTEGER NOT NULL DEFAULT 0,
  is_full_day_complete  INTEGER NOT NULL DEFAULT 0,
  block_completions     TEXT NOT NULL DEFAULT '[]',
  exercise_completions  TEXT NOT NULL DEFAULT '[]',
  completed_by          INTEGER NOT NULL REFERENCES users(id),
  created_at            INTEGER NOT NULL,
  updated_at            INTEGER NOT NULL
);
"#;

pub const CREATE_ROUTINE_COMPLETION_ATTENDEES: &str = r#"
CREATE TABLE IF NOT EXISTS routine_completion_attendees (
  id                      INTEGER PRIMARY KEY AUTOINCREMENT,
  routine_completion_id   INTEGER NOT NULL REFERENCES routine_completions(id) ON DELETE CASCADE,
  student_id              INTEGER NOT NULL REFERENCES users(id),
  participation_minutes   INTEGER NOT NULL DEFAULT 0,
  performance_notes       TEXT NOT NULL DEFAULT '[]',
  completed_full_session  INTEGER NOT NULL DEFAULT 1,
  created_at              INTEGER NOT NULL,
  UNIQUE (routine_completion_id, student_id)
);
"#;

pub const CREATE_PLANNED_CLASSES: &str = r#"
CREATE TABLE IF NOT EXISTS planned_classes (
  id                     INTEGER PRIMARY KEY AUTOINCREMENT,
  title                  TEXT NOT NULL,
  description            TEXT,
  date                   TEXT NOT NULL,
  start_time             TEXT NOT NULL,
  end_time               TEXT NOT NULL,
  duration               INTEGER NOT NULL,
  routine_id             INTEGER REFERENCES routines(id) ON DELETE SET NULL,
  class_type             TEXT NOT NULL DEFAULT 'custom',
  max_participants       INTEGER,
  target_students        TEXT NOT NULL DEFAULT '[]',
  notes                  TEXT NOT NULL DEFAULT '[]',
  status                 TEXT NOT NULL DEFAULT 'planned',
  routine_completion_id  INTEGER REFERENCES routine_completions(id) ON DELETE SET NULL,
  created_by             INTEGER NOT NULL REFERENCES users(id),
  created_at             INTEGER NOT NULL,
  updated_at             INTEGER NOT NULL
);
"#;

pub const INDEX_EXERCISES_FILTERS: &str = "CREATE INDEX IF NOT EXISTS idx_exercises_filters ON exercises(work_type, difficulty, is_active);";

pub const INDEX_ROUTINES_OWNER: &str =
    "CREATE INDEX IF NOT EXISTS idx_routines_owner ON routines(created_by, visibility, is_active);";

pub const INDEX_BLOCKS_ROUTINE: &str =
    "CREATE INDEX IF NOT EXISTS idx_blocks_routine ON routine_blocks(routine_id, sort_order);";

pub const INDEX_BLOCK_EXERCISES_EXERCISE: &str = "CREATE INDEX IF NOT EXISTS idx_block_exercises_exercise ON routine_block_exercises(exercise_id);";

pub const INDEX_COMPLETIONS_ROUTINE: &str = "CREATE INDEX IF NOT EXISTS idx_completions_routine ON routine_completions(routine_id, completed_at);";

pub const INDEX_COMPLETIONS_COMPLETED_AT: &str = "CREATE INDEX IF NOT EXISTS idx_completions_completed_at ON routine_completions(completed_at);";

pub const INDEX_ATTENDEES_STUDENT: &str = "CREATE INDEX IF NOT EXISTS idx_attendees_student ON routine_completion_attendees(student_id);";

pub const INDEX_CLASSES_DATE: &str =
    "CREATE INDEX IF NOT EXISTS idx_classes_date ON planned_classes(date, start_time);";

pub fn schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_USERS,
        CREATE_CATEGORIES,
        CREATE_EXERCISES,
        CREATE_EXERCISE_CATEGORIES,
        CREATE_ROUTINES,
        CREATE_ROUTINE_CATEGORIES,
        CREATE_ROUTINE_BLOCKS,
        CREATE_ROUTINE_BLOCK_EXERCISES,
        CREATE_ROUTINE_COMPLETIONS,
        CREATE_ROUTINE_COMPLETION_ATTENDEES,
        CREATE_PLANNED_CLASSES,
        INDEX_EXERCISES_FILTERS,
        INDEX_ROUTINES_OWNER,
        INDEX_BLOCKS_ROUTINE,
        INDEX_BLOCK_EXERCISES_EXERCISE,
        INDEX_COMPLETIONS_ROUTINE,
        INDEX_COMPLETIONS_COMPLETED_AT,
        INDEX_ATTENDEES_STUDENT,
        INDEX_CLASSES_DATE,
    ]
}
