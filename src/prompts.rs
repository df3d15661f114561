use rand::Rng;
use rand::seq::SliceRandom;

const ANIMALS: &[&str] = &[
    "Cat",
    "Squid",
    "Penguin",
    "Burning Water Deer",
    "Transparent Frog",
    "Disco Octopus",
    "Glow-in-the-dark Raccoon",
    "Breakdancing Koala",
    "Invisible Platypus",
    "Caffeinated Sloth",
];

const HUMANS: &[&str] = &[
    "Awake but Lazy YouTuber",
    "Four-Eyed Grandma",
    "Frog with Milk Cap",
    "Ninja Grandpa on a Hoverboard",
    "Baby with Sunglasses and a Laptop",
    "Clown in Business Attire",
    "Chef Who Only Cooks Ice",
    "Boy Who Thinks He's a Drone",
    "Girl Covered in Stickers",
    "Time-Traveling Mime",
];

const BACKGROUNDS: &[&str] = &[
    "Tralala World",
    "Bubblegum Subway",
    "Melting Playground",
    "Upside-Down Jungle",
    "Pixelated Sky Highway",
    "Underwater Arcade",
    "Rainbow Lava Lake",
    "Giant Sandwich Planet",
    "Cotton Candy Desert",
    "Ceiling of a Giant's Bedroom",
];

const DANCES: &[&str] = &[
    "Tralala Ballet",
    "Bubblegum Tap",
    "Floating Kick",
    "Spinning Noodle Wiggle",
    "Penguin Moonwalk",
    "Crab Shuffle",
    "Electric Tofu Slide",
    "Space Cowboy Boogie",
    "Reverse Slow-Mo Wave",
    "Glitch-Hop Stomp",
];

const ACTIONS: &[&str] = &[
    "Start crying",
    "Flip in the air",
    "Throw something",
    "Throw a chair",
    "Forget everything",
    "Scream into a donut",
    "Summon a mini tornado",
    "Hide inside a cereal box",
    "Explode into confetti",
    "Balance a piano on one toe",
];

const CAMERA_MOVEMENTS: &[&str] = &[
    "Low angle static shot",
    "High angle static shot",
    "Overhead shot",
    "FPV shot",
    "Hand held shot",
    "Wide angle shot",
    "Close up shot",
    "Macro cinematography",
    "Over the shoulder shot",
    "Tracking shot",
    "Establishing wide shot",
    "50mm lens shot",
    "Realistic documentary shot",
];

const MOVEMENT_TYPES: &[&str] = &["grows", "emerges", "ascends", "transforms", "ripples", "unfolds"];

fn pick<'a, R: Rng + ?Sized>(rng: &mut R, list: &'a [&'a str]) -> &'a str {
    list.choose(rng).copied().unwrap_or_default()
}

pub fn micro_story<R: Rng + ?Sized>(rng: &mut R) -> String {
    let animal = pick(rng, ANIMALS);
    let human = pick(rng, HUMANS);
    let background = pick(rng, BACKGROUNDS);
    let dance = pick(rng, DANCES);
    let action = pick(rng, ACTIONS).to_lowercase();

    format!(
        "Write a cursed micro-story (max 3 sentences) set in {background}, \
         where a {animal} and a {human} perform the {dance}. \
         The story should feature surreal emotional twists and chaotic events, \
         like when someone suddenly {action}. \
         End with a haunting image. No logic, no numbers. Only vibes."
    )
}

pub fn scene_image(paragraph: &str) -> String {
    format!(
        "Create an ultra-photorealistic, vertically framed cinematic scene inspired by the story: \"{}\". \
         Focus on a realistic everyday moment with objects resting naturally under gravity. \
         Use soft, natural lighting (golden hour or diffused daylight) with gentle global illumination. \
         Include realistic textures like glass, metal, fabric, and skin, without excessive micro-detail. \
         Choose a neutral camera angle (eye-level or slight low-angle), as if shot on a full-frame DSLR (35mm f/1.8). \
         Apply subtle depth of field for natural background blur. \
         No surreal or levitating elements; everything grounded in real-world physics. \
         No text. Tell the story purely through the visual.",
        paragraph.trim()
    )
}

pub fn timelapse_year(topic: &str, year: i32) -> String {
    format!(
        "Generate a high-quality front view image of {topic} as it appeared in {year}. \
         Include full details clearly visible from the front, such as design, style, and key features. \
         The image should capture the defining characteristics representative of the {year} version of {topic}."
    )
}

pub fn motion<R: Rng + ?Sized>(rng: &mut R, text: &str) -> (String, String) {
    let subjects: Vec<&str> = text
        .split_whitespace()
        .filter(|w| w.chars().count() > 4 && w.chars().all(char::is_alphabetic))
        .take(5)
        .collect();
    let subject = subjects.choose(rng).copied().unwrap_or("surreal scene");
    let camera = pick(rng, CAMERA_MOVEMENTS);
    let movement = pick(rng, MOVEMENT_TYPES);

    let prompt = format!(
        "{camera}: The scene features {subject} with realistic details and natural lighting. \
         The subject {movement} with subtle and minimal motion. \
         The environment is detailed with realistic textures and cinematic lighting."
    );
    (prompt, format!("{camera} / {movement}"))
}
